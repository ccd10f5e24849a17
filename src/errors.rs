//! Errors raised by the ledger.
//!
//! Variants fall into two groups. Validation errors mean the message was
//! rejected before touching state and its inbound funds should be refunded.
//! Internal errors mean an unexpected state (missing record, invariant breach,
//! collaborator failure) and are surfaced with context. Soft conditions such
//! as clamped slashes are never errors; they are logged and reported as events.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while applying ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed or inconsistent input.
    #[error("invalid message: {0}")]
    Validation(String),

    /// The signer is not allowed to perform this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The address holds no (or not enough) liquidity for the request.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Add-liquidity addresses do not match the existing position.
    #[error("liquidity provider address mismatch")]
    MismatchedAddress,

    /// A bounded collection is full.
    #[error("capacity exceeded: {what} (max {max})")]
    CapacityExceeded {
        /// Collection that is full.
        what: &'static str,
        /// Configured maximum.
        max: usize,
    },

    /// The operator tried to raise the fee after a third party bonded.
    #[error("can't increase operator fee after a provider has bonded")]
    FeeIncreaseLocked,

    /// A governance switch has paused the operation.
    #[error("{0} has been paused")]
    Paused(&'static str),

    /// A record the operation depends on does not exist.
    #[error("missing {entity} record: {key}")]
    MissingRecord {
        /// Entity type.
        entity: &'static str,
        /// Lookup key.
        key: String,
    },

    /// An arithmetic or accounting invariant would be broken.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A pool would hold claims against a zero balance.
    #[error("pool {0} cannot have zero settlement or asset balance")]
    ZeroBacking(String),

    /// Arithmetic overflow in unit issuance.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// A Yggdrasil vault was required.
    #[error("vault {0} is not a Yggdrasil vault")]
    NotYggdrasil(String),

    /// A vault still holds funds and cannot be deleted.
    #[error("vault {0} still holds funds")]
    VaultNotEmpty(String),

    /// No behavior is registered for the active protocol version.
    #[error("no handler for protocol version {0}")]
    BadVersion(String),

    /// Record encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The outbound queue rejected an item.
    #[error("outbound queue rejected item: {0}")]
    Outbound(String),
}

impl LedgerError {
    /// Whether the error is a validation failure (refund the inbound funds).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::Unauthorized(_)
                | LedgerError::InsufficientLiquidity(_)
                | LedgerError::MismatchedAddress
                | LedgerError::CapacityExceeded { .. }
                | LedgerError::FeeIncreaseLocked
                | LedgerError::Paused(_)
        )
    }

    pub(crate) fn missing(entity: &'static str, key: impl ToString) -> Self {
        LedgerError::MissingRecord {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Codec(err.to_string())
    }
}
