//! Append-only event store boundary.
//!
//! Storage-agnostic: the workflow only sees the `EventStore` trait. The
//! in-memory store backs tests and development.

pub mod in_memory;
pub mod r#trait;

use procureflow_core::{AggregateId, ExpectedVersion};
use procureflow_events::{EventBus, EventEnvelope};

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Adapter that publishes committed events to an `EventBus` after a successful append.
///
/// Publication happens only after the append succeeds. A publish failure is
/// reported, but the events stay committed (at-least-once).
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> PublishingEventStore<S, B>
where
    B: EventBus<EventEnvelope<serde_json::Value>>,
{
    fn publish(&self, committed: &[StoredEvent]) -> Result<(), EventStoreError> {
        for e in committed {
            self.bus
                .publish(e.to_envelope())
                .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;
        }
        Ok(())
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<serde_json::Value>>,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let committed = self.store.append(events, expected_version)?;
        self.publish(&committed)?;
        Ok(committed)
    }

    fn append_all(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let committed = self.store.append_all(batches)?;
        self.publish(&committed)?;
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(aggregate_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use procureflow_events::InMemoryEventBus;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn publishes_only_committed_events() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
            Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let store = PublishingEventStore::new(InMemoryEventStore::new(), bus.clone());
        let id = AggregateId::new();
        let event = UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: id,
            aggregate_type: "purchasing.order".to_string(),
            event_type: "purchasing.order.created".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };

        store
            .append(vec![event.clone()], ExpectedVersion::NoStream)
            .unwrap();
        assert!(store.append(vec![event], ExpectedVersion::NoStream).is_err());

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_id(), id);
        assert_eq!(published[0].sequence_number(), 1);
    }
}
