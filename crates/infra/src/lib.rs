//! Infrastructure layer: serialized execution, journal, payout rail, config.
//!
//! The ledger aggregate is pure; this crate is where it meets the outside
//! world. `LedgerService` is the single mutual-exclusion domain every
//! mutating call goes through.

pub mod config;
pub mod journal;
pub mod payout;
pub mod service;


pub use config::{ConfigError, LedgerConfig};
pub use journal::{Journal, JournalError, LedgerEnvelope, StagedAppend};
pub use payout::{Payout, PayoutError, RecordingPayout, Transfer};
pub use service::{CallContext, LedgerService, ServiceError};
