//! Amount value object: a non-negative quantity of the single fungible unit.
//!
//! All arithmetic is checked. Nothing in the ledger ever wraps or saturates
//! on a value that came from a caller.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Non-negative amount in the smallest indivisible unit.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl ValueObject for Amount {}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> DomainResult<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| DomainError::overflow(format!("{} + {}", self.0, other.0)))
    }

    pub fn checked_sub(self, other: Amount) -> DomainResult<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| DomainError::underflow(format!("{} - {}", self.0, other.0)))
    }

    pub fn checked_mul(self, factor: u64) -> DomainResult<Amount> {
        self.0
            .checked_mul(factor)
            .map(Amount)
            .ok_or_else(|| DomainError::overflow(format!("{} * {}", self.0, factor)))
    }

    /// Floor division and remainder by a positive divisor.
    ///
    /// Returns `None` for a zero divisor.
    pub fn div_rem(self, divisor: u64) -> Option<(Amount, Amount)> {
        if divisor == 0 {
            return None;
        }
        Some((Amount(self.0 / divisor), Amount(self.0 % divisor)))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
