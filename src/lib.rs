//! Client layer for an append-only crowdfunding ledger.
//!
//! Turns application intents ("create a campaign", "donate to campaign N")
//! into typed ledger calls, and raw ledger records back into application
//! models:
//!
//! * [`amount`]: exact decimal ⇄ base-unit conversion.
//! * [`abi`]: method signatures and call values of the wire contract.
//! * [`campaign`] / [`donation`]: mapping of raw view results.
//! * [`transaction`]: construction of the two supported writes.
//! * [`gateway`]: reads, writes and ownership filtering against a
//!   [`gateway::LedgerBackend`] for the account an
//!   [`gateway::IdentityProvider`] reports.
//! * [`ledger`]: an in-memory backend emulating the deployed contract.

pub mod abi;
pub mod amount;
pub mod campaign;
pub mod config;
pub mod donation;
pub mod gateway;
pub mod ledger;
pub mod transaction;

mod error;

pub use error::{BackendError, LedgerError, LedgerResult};
