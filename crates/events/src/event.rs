use chrono::{DateTime, Utc};

/// A fact recorded in a journal and fanned out as a notification.
///
/// `event_type` values are persisted with every envelope and checked again on
/// restore, so they must never be renamed. Ledger events use the
/// `splitter.ledger.<snake_case>` namespace. A payload whose shape changes
/// keeps its type name and bumps `version` instead.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Payload schema version, starting at 1.
    fn version(&self) -> u32;

    /// Time supplied by the command that produced the event, not the time of
    /// journaling.
    fn occurred_at(&self) -> DateTime<Utc>;
}
