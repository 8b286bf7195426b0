//! Domain events and their ordered, per-aggregate history.

pub mod envelope;
pub mod event;
pub mod stream;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use stream::EventStream;
