use chrono::{DateTime, Utc};

/// A persisted domain fact.
///
/// Events are immutable, versioned and append-only. The `event_type` string is
/// stable across releases (e.g. "purchasing.order.stage_approved").
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
