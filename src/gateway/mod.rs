//! Ledger gateway
//!
//! Orchestrates reads and writes against the campaign ledger on behalf of
//! the current account. Writes never error out of this boundary: every
//! failure, local or remote, comes back as a [`TransactionOutcome`].
//!
//! Nothing is cached. Each read re-fetches the full enumeration, and a
//! campaign's `p_id` is only meaningful relative to the read that produced it.
//! Submissions are not retried; resending a ledger write risks duplication.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::abi::{AbiValue, Address, ReadCall, GET_CAMPAIGNS, GET_DONATORS};
use crate::amount::AmountCodec;
use crate::campaign::{Campaign, CampaignMapper};
use crate::config::{ConfigError, GatewayConfig};
use crate::donation::{Donation, DonationAggregator};
use crate::error::{BackendError, LedgerError, LedgerResult};
use crate::transaction::{CampaignForm, MutationRequest, TransactionBuilder};

pub type TransactionId = String;

/// The persistent ledger the gateway talks to.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Dispatches a write signed by `sender`. Returns once the ledger has
    /// either accepted it (with its transaction id) or refused it.
    async fn submit(
        &self,
        sender: &str,
        request: &MutationRequest,
    ) -> Result<TransactionId, BackendError>;

    /// Evaluates a view call and returns its decoded return values.
    async fn read(&self, call: &ReadCall) -> Result<Vec<AbiValue>, BackendError>;
}

#[async_trait]
impl<T: LedgerBackend + ?Sized> LedgerBackend for Arc<T> {
    async fn submit(
        &self,
        sender: &str,
        request: &MutationRequest,
    ) -> Result<TransactionId, BackendError> {
        (**self).submit(sender, request).await
    }

    async fn read(&self, call: &ReadCall) -> Result<Vec<AbiValue>, BackendError> {
        (**self).read(call).await
    }
}

/// Supplies the caller's account, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_account(&self) -> Option<Address>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    fn current_account(&self) -> Option<Address> {
        (**self).current_account()
    }
}

/// A fixed identity, e.g. from a command-line flag.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity(pub Option<Address>);

impl IdentityProvider for StaticIdentity {
    fn current_account(&self) -> Option<Address> {
        self.0.clone()
    }
}

/// Identity backed by a wallet session that can sign in and out.
#[derive(Debug)]
pub struct SessionIdentity {
    account: watch::Sender<Option<Address>>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdentity {
    pub fn new() -> Self {
        let (account, _) = watch::channel(None);
        Self { account }
    }

    pub fn sign_in(&self, address: impl Into<Address>) {
        self.account.send_replace(Some(address.into()));
    }

    pub fn sign_out(&self) {
        self.account.send_replace(None);
    }

    /// Receiver that observes account switches.
    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.account.subscribe()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_account(&self) -> Option<Address> {
        self.account.borrow().clone()
    }
}

/// Result of submitting a mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Accepted by the ledger.
    Confirmed { transaction_id: TransactionId },
    /// Refused locally before submission, or by the backend.
    Rejected { cause: LedgerError },
    /// The caller stopped waiting. The ledger may still accept the write.
    Unknown { waited: Duration },
}

impl TransactionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransactionOutcome::Confirmed { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            TransactionOutcome::Confirmed { transaction_id } => Some(transaction_id),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&LedgerError> {
        match self {
            TransactionOutcome::Rejected { cause } => Some(cause),
            _ => None,
        }
    }
}

impl From<LedgerError> for TransactionOutcome {
    fn from(cause: LedgerError) -> Self {
        TransactionOutcome::Rejected { cause }
    }
}

pub struct LedgerGateway<B, I> {
    backend: B,
    identity: I,
    builder: TransactionBuilder,
    mapper: CampaignMapper,
    aggregator: DonationAggregator,
    submit_timeout: Option<Duration>,
}

impl<B: LedgerBackend, I: IdentityProvider> LedgerGateway<B, I> {
    pub fn new(backend: B, identity: I) -> Self {
        Self::with_codec(backend, identity, AmountCodec::default())
    }

    pub fn with_codec(backend: B, identity: I, codec: AmountCodec) -> Self {
        Self {
            backend,
            identity,
            builder: TransactionBuilder::new(codec),
            mapper: CampaignMapper::new(codec),
            aggregator: DonationAggregator::new(codec),
            submit_timeout: None,
        }
    }

    pub fn from_config(
        backend: B,
        identity: I,
        config: &GatewayConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = config
            .codec()
            .ok_or(ConfigError::UnsupportedDecimals(config.decimals))?;
        let mut gateway = Self::with_codec(backend, identity, codec);
        gateway.submit_timeout = config.submit_timeout();
        Ok(gateway)
    }

    /// Bounds how long a submission is awaited before reporting an unknown outcome.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn current_account(&self) -> Option<Address> {
        self.identity
            .current_account()
            .filter(|account| !account.is_empty())
    }

    pub async fn create_campaign(&self, form: &CampaignForm) -> TransactionOutcome {
        let Some(account) = self.current_account() else {
            return LedgerError::Unauthenticated.into();
        };
        match self.builder.build_create_campaign(&account, form) {
            Ok(request) => self.submit(&account, request).await,
            Err(cause) => {
                debug!(%cause, "create campaign rejected before submission");
                cause.into()
            }
        }
    }

    pub async fn donate(&self, p_id: u64, amount: &str) -> TransactionOutcome {
        let Some(account) = self.current_account() else {
            return LedgerError::Unauthenticated.into();
        };
        match self.builder.build_donate(p_id, amount) {
            Ok(request) => self.submit(&account, request).await,
            Err(cause) => {
                debug!(p_id, %cause, "donation rejected before submission");
                cause.into()
            }
        }
    }

    pub async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        let result = self
            .backend
            .read(&ReadCall::new(GET_CAMPAIGNS, vec![]))
            .await
            .map_err(LedgerError::ReadFailure)?;
        let records = match result.as_slice() {
            [AbiValue::Array(records)] => records,
            _ => {
                return Err(LedgerError::ReadFailure(BackendError::Decode(format!(
                    "getCampaigns returned {} values, expected one array",
                    result.len()
                ))))
            }
        };
        let campaigns = records
            .iter()
            .zip(0u64..)
            .map(|(raw, index)| self.mapper.map(raw, index))
            .collect::<LedgerResult<Vec<_>>>()?;
        debug!(count = campaigns.len(), "campaigns read");
        Ok(campaigns)
    }

    /// Campaigns owned by the current account; empty when nobody is signed in.
    pub async fn list_owned_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        let Some(account) = self.current_account() else {
            return Ok(Vec::new());
        };
        let mut campaigns = self.list_campaigns().await?;
        campaigns.retain(|campaign| campaign.owner.eq_ignore_ascii_case(&account));
        Ok(campaigns)
    }

    pub async fn list_donations(&self, p_id: u64) -> LedgerResult<Vec<Donation>> {
        let result = self
            .backend
            .read(&ReadCall::new(GET_DONATORS, vec![AbiValue::uint(p_id)]))
            .await
            .map_err(LedgerError::ReadFailure)?;
        let donations = self.aggregator.aggregate_raw(p_id, &result)?;
        debug!(p_id, count = donations.len(), "donations read");
        Ok(donations)
    }

    async fn submit(&self, sender: &str, request: MutationRequest) -> TransactionOutcome {
        let method = request.signature();
        debug!(method, sender, "submitting mutation");
        let dispatch = self.backend.submit(sender, &request);
        let result = match self.submit_timeout {
            Some(limit) => match tokio::time::timeout(limit, dispatch).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(method, waited = ?limit, "submission outcome unknown");
                    return TransactionOutcome::Unknown { waited: limit };
                }
            },
            None => dispatch.await,
        };
        match result {
            Ok(transaction_id) => {
                info!(method, tx = %transaction_id, "mutation confirmed");
                TransactionOutcome::Confirmed { transaction_id }
            }
            Err(cause) => {
                warn!(method, %cause, "mutation rejected");
                LedgerError::SubmissionFailure(cause).into()
            }
        }
    }
}
