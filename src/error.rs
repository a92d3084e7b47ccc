//! Error taxonomy shared by the encoder, the channel adapters and the session machine.
//!
//! # Categories
//! - `ValidationError`: bad intent or user input, recovered locally and shown inline
//! - `AdapterError`: a collaborator call failed; every adapter returns it instead of panicking
//! - `SigningError`: the outcome-level classification recorded on a finished session

use serde::Serialize;
use thiserror::Error;

/// Form field a validation failure is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Consent,
    RewardDelay,
    RewardRate,
    HookValue,
    HookTopic,
    Seat,
    SeatAddress,
    TargetLayer,
    Destination,
    Amount,
    Domain,
    Transaction,
}

/// Errors raised while validating an intent or acknowledgment input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field required by the intent kind is absent.
    #[error("{kind} requires {field:?}")]
    MissingField { kind: String, field: FormField },

    /// User input failed a field-level check.
    #[error("{message}")]
    InvalidInput { field: FormField, message: String },

    /// Submission attempted before consent was given.
    #[error("acknowledgment required before signing")]
    AcknowledgmentRequired,
}

impl ValidationError {
    pub fn invalid(field: FormField, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Field the error should be displayed next to.
    pub fn field(&self) -> FormField {
        match self {
            ValidationError::MissingField { field, .. } => *field,
            ValidationError::InvalidInput { field, .. } => *field,
            ValidationError::AcknowledgmentRequired => FormField::Consent,
        }
    }
}

/// Errors returned by channel adapters (wallet provider, push, ledger, broker).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status from a collaborator.
    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Call exceeded its deadline.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// Error text reported by the wallet provider, surfaced verbatim.
    #[error("{0}")]
    Provider(String),

    /// Push channel ended before a terminal event.
    #[error("push channel closed")]
    ChannelClosed,

    /// Circuit breaker refused the call.
    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdapterError::Decode(e.to_string())
        } else {
            AdapterError::Http(e.to_string())
        }
    }
}

/// Outcome-level error recorded on a session that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Wallet provider reported the payload expired.
    #[error("signing request expired")]
    ProtocolTimeout,

    /// Rejected in the wallet app or canceled by the user.
    #[error("signing request rejected")]
    UserRejected,
}

/// Result type for adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;
