//! In-memory, append-only event history for a single aggregate.

use realty_core::AggregateId;

use crate::envelope::EventEnvelope;
use crate::event::Event;

/// Ordered history of the events applied to one aggregate.
///
/// Registries keep one stream per aggregate so lifecycle history (milestones,
/// audit trails) can be rendered without storing it twice on the aggregate.
#[derive(Debug, Clone)]
pub struct EventStream<E> {
    aggregate_id: AggregateId,
    aggregate_type: &'static str,
    events: Vec<EventEnvelope<E>>,
}

impl<E: Event> EventStream<E> {
    pub fn new(aggregate_id: AggregateId, aggregate_type: &'static str) -> Self {
        Self {
            aggregate_id,
            aggregate_type,
            events: Vec::new(),
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    /// Current stream revision (0 when empty).
    pub fn revision(&self) -> u64 {
        self.events.last().map(EventEnvelope::sequence).unwrap_or(0)
    }

    /// Append a batch of events, assigning consecutive sequence numbers.
    pub fn append(&mut self, events: impl IntoIterator<Item = E>) {
        for payload in events {
            let next = self.revision() + 1;
            self.events.push(EventEnvelope::record(next, payload));
        }
    }

    pub fn events(&self) -> &[EventEnvelope<E>] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Noted {
        at: DateTime<Utc>,
    }

    impl Event for Noted {
        fn event_type(&self) -> &'static str {
            "test.noted"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn sequence_numbers_are_consecutive_across_batches() {
        let mut stream = EventStream::new(AggregateId::new(), "test");
        assert_eq!(stream.revision(), 0);

        stream.append(vec![Noted { at: Utc::now() }, Noted { at: Utc::now() }]);
        stream.append(vec![Noted { at: Utc::now() }]);

        let seqs: Vec<u64> = stream.events().iter().map(EventEnvelope::sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(stream.revision(), 3);
        assert!(stream.events().iter().all(|e| e.event_type() == "test.noted"));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut stream: EventStream<Noted> = EventStream::new(AggregateId::new(), "test");
        stream.append(Vec::new());
        assert!(stream.is_empty());
    }
}
