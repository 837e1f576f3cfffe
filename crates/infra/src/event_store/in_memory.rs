use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use procureflow_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock covers a whole `append_all`, so
/// multi-stream commits are atomic with respect to other writers.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty streams.
    pub fn stream_count(&self) -> Result<usize, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.values().filter(|s| !s.is_empty()).count())
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn validate_batch(batch: &StreamAppend) -> Result<(), EventStoreError> {
        let Some(first) = batch.events.first() else {
            return Ok(());
        };
        for (idx, e) in batch.events.iter().enumerate() {
            if e.aggregate_id != batch.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch for {} contains aggregate {} (index {idx})",
                    batch.aggregate_id, e.aggregate_id
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }
        Ok(())
    }

    fn check_stream(stream: &[StoredEvent], batch: &StreamAppend) -> Result<(), EventStoreError> {
        let current = Self::current_version(stream);
        if !batch.expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {}: expected {:?}, found {current}",
                batch.aggregate_id, batch.expected_version
            )));
        }

        if let (Some(existing), Some(incoming)) = (stream.first(), batch.events.first()) {
            if existing.aggregate_type != incoming.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, incoming.aggregate_type
                )));
            }
        }
        Ok(())
    }

    fn to_stored(event: UncommittedEvent, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            event_id: event.event_id,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_number,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Unavailable("lock poisoned".to_string())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        self.append_all(vec![StreamAppend::new(aggregate_id, expected_version, events)])
    }

    fn append_all(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let batches: Vec<StreamAppend> = batches.into_iter().filter(|b| !b.events.is_empty()).collect();
        if batches.is_empty() {
            return Ok(vec![]);
        }

        let mut seen = HashSet::new();
        for batch in &batches {
            Self::validate_batch(batch)?;
            if !seen.insert(batch.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one commit",
                    batch.aggregate_id
                )));
            }
        }

        let mut streams = self.streams.write().map_err(|_| poisoned())?;

        // Check phase: nothing is written unless every stream passes.
        for batch in &batches {
            let stream = streams
                .get(&batch.aggregate_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            Self::check_stream(stream, batch)?;
        }

        let mut committed = Vec::new();
        for batch in batches {
            let stream = streams.entry(batch.aggregate_id).or_default();
            let mut next = Self::current_version(stream) + 1;
            for event in batch.events {
                let stored = Self::to_stored(event, next);
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}
