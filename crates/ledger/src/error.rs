use thiserror::Error;

use splitter_core::{AccountId, Amount, DomainError};

/// Rejections of a requested ledger state transition.
///
/// Every variant means "nothing changed": the ledger decides before it
/// mutates, so a caller may retry or give up without cleanup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("recipient is the invalid account identifier")]
    InvalidRecipient,

    #[error("recipient {recipient} is already registered")]
    DuplicateRecipient { recipient: AccountId },

    #[error("caller has no split recipients")]
    NoRecipients,

    #[error("split amount must be greater than zero")]
    ZeroAmount,

    #[error("split amount {amount} is smaller than the {recipients} registered recipients")]
    AmountTooSmall { amount: Amount, recipients: usize },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("recipient set is full (limit {limit})")]
    TooManyRecipients { limit: usize },

    #[error(transparent)]
    Arithmetic(#[from] DomainError),

    #[error("conservation invariant violated: {0}")]
    ConservationViolated(String),
}

impl LedgerError {
    pub fn conservation(msg: impl Into<String>) -> Self {
        Self::ConservationViolated(msg.into())
    }
}
