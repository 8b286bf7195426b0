//! Command/event traits shared by the lifecycle aggregates
//! (service requests, experiments).

/// Identity and revision of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Count of events applied so far.
    fn version(&self) -> u64;
}

/// `handle` checks a command against the current state and returns the
/// resulting events without touching state; `apply` folds one event in.
/// Neither does IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Must bump `version()` by one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// `handle`, then `apply` each event. A rejected command applies nothing.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        events.iter().for_each(|event| self.apply(event));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;

    #[derive(Debug, Default)]
    struct Counter {
        id: u32,
        total: i64,
        version: u64,
    }

    impl AggregateRoot for Counter {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = i64;
        type Event = i64;
        type Error = DomainError;

        fn apply(&mut self, event: &i64) {
            self.total += event;
            self.version += 1;
        }

        fn handle(&self, command: &i64) -> Result<Vec<i64>, DomainError> {
            if *command <= 0 {
                return Err(DomainError::validation("increment must be positive"));
            }
            Ok(vec![*command])
        }
    }

    #[test]
    fn execute_applies_emitted_events() {
        let mut counter = Counter::default();
        let events = counter.execute(&3).unwrap();
        assert_eq!(events, vec![3]);
        assert_eq!(counter.total, 3);
        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let mut counter = Counter::default();
        counter.execute(&2).unwrap();
        let err = counter.execute(&-1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(counter.total, 2);
        assert_eq!(counter.version(), 1);
    }
}
