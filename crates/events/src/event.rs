use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate command.
///
/// Payloads are plain data; ordering and identity live on the
/// [`EventEnvelope`](crate::EventEnvelope) that wraps them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<crate>.<aggregate>.<what happened>`.
    fn event_type(&self) -> &'static str;

    /// Business time of the change, as stamped by the command.
    fn occurred_at(&self) -> DateTime<Utc>;
}
