//! Transaction scope over the event store.
//!
//! A `UnitOfWork` collects events for any number of streams and writes them
//! with one `append_all`. Dropping it without `commit` discards everything.

use serde::Serialize;
use uuid::Uuid;

use procureflow_core::{AggregateId, ExpectedVersion};
use procureflow_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

pub struct UnitOfWork<'s, S: EventStore + ?Sized> {
    store: &'s S,
    staged: Vec<StreamAppend>,
}

impl<'s, S: EventStore + ?Sized> UnitOfWork<'s, S> {
    pub fn begin(store: &'s S) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    /// Stage `events` for one stream.
    ///
    /// Staging the same stream again extends its batch; the version
    /// expectation from the first call is kept.
    pub fn stage<E>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: ExpectedVersion,
        events: &[E],
    ) -> Result<(), EventStoreError>
    where
        E: Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }

        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        match self.staged.iter_mut().find(|b| b.aggregate_id == aggregate_id) {
            Some(batch) => batch.events.extend(uncommitted),
            None => self
                .staged
                .push(StreamAppend::new(aggregate_id, expected_version, uncommitted)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Streams touched so far, in staging order.
    pub fn staged_streams(&self) -> Vec<AggregateId> {
        self.staged.iter().map(|b| b.aggregate_id).collect()
    }

    pub fn staged_event_count(&self) -> usize {
        self.staged.iter().map(|b| b.events.len()).sum()
    }

    /// Write every staged stream atomically.
    pub fn commit(self) -> Result<Vec<StoredEvent>, EventStoreError> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }
        self.store.append_all(self.staged)
    }

    /// Discard staged events explicitly.
    pub fn rollback(self) {
        if !self.staged.is_empty() {
            tracing::debug!(
                streams = self.staged.len(),
                events = self.staged_event_count(),
                "unit of work rolled back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Noted {
        at: DateTime<Utc>,
    }

    impl Event for Noted {
        fn event_type(&self) -> &'static str {
            "test.noted"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn noted() -> Noted {
        Noted { at: Utc::now() }
    }

    #[test]
    fn commit_writes_all_staged_streams() {
        let store = InMemoryEventStore::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());

        let mut uow = UnitOfWork::begin(&store);
        uow.stage(a, "test", ExpectedVersion::NoStream, &[noted()]).unwrap();
        uow.stage(b, "test", ExpectedVersion::NoStream, &[noted(), noted()]).unwrap();
        uow.stage(a, "test", ExpectedVersion::Exact(99), &[noted()]).unwrap();
        assert_eq!(uow.staged_streams(), vec![a, b]);

        let committed = uow.commit().unwrap();
        assert_eq!(committed.len(), 4);
        assert_eq!(store.load_stream(a).unwrap().len(), 2);
        assert_eq!(store.load_stream(b).unwrap().len(), 2);
    }

    #[test]
    fn rollback_leaves_store_untouched() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();

        let mut uow = UnitOfWork::begin(&store);
        uow.stage(a, "test", ExpectedVersion::NoStream, &[noted()]).unwrap();
        uow.rollback();

        assert!(store.load_stream(a).unwrap().is_empty());
    }

    #[test]
    fn failed_commit_writes_nothing() {
        let store = InMemoryEventStore::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());
        store
            .append(
                vec![UncommittedEvent::from_typed(b, "test", Uuid::now_v7(), &noted()).unwrap()],
                ExpectedVersion::NoStream,
            )
            .unwrap();

        let mut uow = UnitOfWork::begin(&store);
        uow.stage(a, "test", ExpectedVersion::NoStream, &[noted()]).unwrap();
        uow.stage(b, "test", ExpectedVersion::NoStream, &[noted()]).unwrap();

        assert!(matches!(uow.commit(), Err(EventStoreError::Concurrency(_))));
        assert!(store.load_stream(a).unwrap().is_empty());
    }
}
