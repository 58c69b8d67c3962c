use thiserror::Error;

/// Failure reported by a ledger backend for a submission or a view call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The call never reached the ledger (transport, RPC node, ...).
    #[error("network failure: {0}")]
    Network(String),

    /// The ledger evaluated the call and refused it.
    #[error("reverted: {0}")]
    Reverted(String),

    /// The account holder declined to sign.
    #[error("cancelled by user")]
    Cancelled,

    /// The backend answered with something it could not decode.
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Canonical error type of the ledger interaction layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is not a well-formed non-negative decimal.
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmountFormat { input: String, reason: &'static str },

    /// Amount carries more significant fractional digits than base units allow.
    #[error("amount {input:?} has more than {decimals} significant fractional digits")]
    PrecisionLoss { input: String, decimals: u32 },

    /// Amount does not fit the base-unit register.
    #[error("amount {input:?} is out of range")]
    AmountOutOfRange { input: String },

    /// The ledger returned a campaign tuple of the wrong shape.
    #[error("malformed campaign record at index {index}: {reason}")]
    MalformedCampaignRecord { index: u64, reason: String },

    /// The ledger returned a donation response of the wrong shape.
    #[error("malformed donation record for campaign {p_id}: {reason}")]
    MalformedDonationRecord { p_id: u64, reason: String },

    #[error("donor/amount arity mismatch: {donors} donors, {amounts} amounts")]
    DonationArityMismatch { donors: usize, amounts: usize },

    /// A write was attempted without a resolved account.
    #[error("no authenticated account")]
    Unauthenticated,

    #[error("invalid deadline {input:?}: {reason}")]
    InvalidDeadline { input: String, reason: String },

    #[error("invalid donation amount {input:?}: must be greater than zero")]
    InvalidDonationAmount { input: String },

    /// Parameters do not match the method signature they are sent with.
    #[error("invalid parameters for {method}: {reason}")]
    InvalidCallParameters { method: &'static str, reason: String },

    #[error("submission failed: {0}")]
    SubmissionFailure(BackendError),

    #[error("read failed: {0}")]
    ReadFailure(BackendError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
