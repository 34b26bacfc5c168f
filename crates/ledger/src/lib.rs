//! Payment-splitting ledger (event-sourced).
//!
//! Accounts register an ordered set of recipients; a deposit ("split") is
//! divided evenly among them with the remainder credited back to the
//! depositor, and recipients withdraw from their accrued balance.
//!
//! Pure domain logic only: no IO, no locking, no payout rail. Those live in
//! `splitter-infra`.

pub mod error;
pub mod ledger;
pub mod recipients;

pub use error::LedgerError;
pub use ledger::{
    Ledger, LedgerCommand, LedgerEvent, LedgerId, RecipientAdded, RegisterRecipient, Split,
    SplitPerformed, Withdraw, Withdrawn,
};
pub use recipients::RecipientSet;
