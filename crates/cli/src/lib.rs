//! Script runner for the splitter ledger.
//!
//! Plays a JSON list of calls against a fresh in-memory ledger, acting as the
//! execution environment (caller identity, attached value, payout rail).

pub mod args;
pub mod script;

pub use args::Args;
pub use script::{Report, Step, StepOutcome, run};
