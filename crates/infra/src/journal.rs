//! Append-only ledger journal.
//!
//! The journal is the ledger's source of truth: replaying it rebuilds the
//! exact state. Sequence numbers start at 1 and increase by one per event.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitter_core::ExpectedVersion;
use splitter_events::{Event, EventEnvelope};
use splitter_ledger::{LedgerEvent, LedgerId};

pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

/// Aggregate type recorded on every envelope.
pub const AGGREGATE_TYPE: &str = "splitter.ledger";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// Optimistic concurrency failure (the journal moved since the decision).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Stored entries violate the journal's structural invariants.
    #[error("corrupt journal: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    ledger_id: LedgerId,
    entries: Vec<LedgerEnvelope>,
}

/// Envelopes prepared against the journal's current version, not yet visible.
///
/// Holding a `StagedAppend` keeps the journal mutably borrowed, so nothing
/// can be appended in between staging and [`StagedAppend::commit`].
#[derive(Debug)]
pub struct StagedAppend<'a> {
    journal: &'a mut Journal,
    entries: Vec<LedgerEnvelope>,
}

impl StagedAppend<'_> {
    pub fn entries(&self) -> &[LedgerEnvelope] {
        &self.entries
    }

    /// Make the staged envelopes part of the journal; returns copies of them.
    pub fn commit(self) -> Vec<LedgerEnvelope> {
        self.journal.entries.extend(self.entries.iter().cloned());
        self.entries
    }
}

impl Journal {
    pub fn new(ledger_id: LedgerId) -> Self {
        Self {
            ledger_id,
            entries: Vec::new(),
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// Sequence number of the last entry (0 when empty).
    pub fn version(&self) -> u64 {
        self.entries.last().map(|e| e.sequence_number()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEnvelope] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.entries.iter().map(EventEnvelope::payload)
    }

    /// Assign sequence numbers to `events` if the journal is at `expected`.
    pub fn stage(
        &mut self,
        events: Vec<LedgerEvent>,
        expected: ExpectedVersion,
    ) -> Result<StagedAppend<'_>, JournalError> {
        let current = self.version();
        expected
            .check(current)
            .map_err(|e| JournalError::Concurrency(e.to_string()))?;

        let entries = events
            .into_iter()
            .zip(current + 1..)
            .map(|(event, sequence_number)| {
                EventEnvelope::wrap(self.ledger_id.0, AGGREGATE_TYPE, sequence_number, event)
            })
            .collect();

        Ok(StagedAppend {
            journal: self,
            entries,
        })
    }

    pub fn append(
        &mut self,
        events: Vec<LedgerEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<LedgerEnvelope>, JournalError> {
        Ok(self.stage(events, expected)?.commit())
    }

    /// Check the structural invariants of a journal loaded from elsewhere.
    pub fn validate(&self) -> Result<(), JournalError> {
        let mut last = 0u64;
        let mut seen = HashSet::with_capacity(self.entries.len());
        for (idx, e) in self.entries.iter().enumerate() {
            if e.aggregate_id() != self.ledger_id.0 {
                return Err(JournalError::Corrupt(format!(
                    "entry {idx} belongs to aggregate {}",
                    e.aggregate_id()
                )));
            }
            if e.aggregate_type() != AGGREGATE_TYPE {
                return Err(JournalError::Corrupt(format!(
                    "entry {idx} has aggregate_type '{}'",
                    e.aggregate_type()
                )));
            }
            if e.event_type() != e.payload().event_type() {
                return Err(JournalError::Corrupt(format!(
                    "entry {idx} labelled '{}' but carries '{}'",
                    e.event_type(),
                    e.payload().event_type()
                )));
            }
            if e.sequence_number() != last + 1 {
                return Err(JournalError::Corrupt(format!(
                    "non-contiguous sequence_number (last={last}, found={})",
                    e.sequence_number()
                )));
            }
            if !seen.insert(e.event_id()) {
                return Err(JournalError::Corrupt(format!(
                    "entry {idx} repeats event_id {}",
                    e.event_id()
                )));
            }
            last = e.sequence_number();
        }
        Ok(())
    }
}
