//! Outbound value transfer (the payout rail behind `withdraw`).

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitter_core::{AccountId, Amount};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("transfer of {amount} to {to} rejected: {reason}")]
    Rejected {
        to: AccountId,
        amount: Amount,
        reason: String,
    },

    #[error("payout rail unavailable")]
    Unavailable,
}

/// External value-transfer primitive.
///
/// `transfer` returning `Ok` means the transfer is committed (or guaranteed
/// to be). The service calls it while holding the ledger lock and applies the
/// matching debit only afterwards, so an `Err` leaves the ledger untouched.
pub trait Payout: Send + Sync {
    fn transfer(&self, to: AccountId, amount: Amount) -> Result<(), PayoutError>;
}

impl<T> Payout for Arc<T>
where
    T: Payout + ?Sized,
{
    fn transfer(&self, to: AccountId, amount: Amount) -> Result<(), PayoutError> {
        (**self).transfer(to, amount)
    }
}

/// One committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub to: AccountId,
    pub amount: Amount,
}

/// In-memory payout rail: records transfers, can be switched into failure.
#[derive(Debug, Default)]
pub struct RecordingPayout {
    transfers: Mutex<Vec<Transfer>>,
    failure: Mutex<Option<PayoutError>>,
}

impl RecordingPayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent transfer fail with `error` (`None` restores service).
    pub fn fail_with(&self, error: Option<PayoutError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total_paid_to(&self, account: &AccountId) -> u64 {
        self.transfers()
            .iter()
            .filter(|t| t.to == *account)
            .map(|t| t.amount.units())
            .sum()
    }
}

impl Payout for RecordingPayout {
    fn transfer(&self, to: AccountId, amount: Amount) -> Result<(), PayoutError> {
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        self.transfers
            .lock()
            .map_err(|_| PayoutError::Unavailable)?
            .push(Transfer { to, amount });
        Ok(())
    }
}
