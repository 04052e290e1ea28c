// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Event Store
//!
//! Keeps committed events as [`EventRecord`] rows behind a single lock. The
//! write lock is the transaction: the uniqueness check on (aggregate id,
//! sequence number) and the assignment of global sequence numbers happen
//! under it, so concurrent writers serialize there and nowhere else.
//!
//! Reads return paged cursors. A cursor captures the head at call time,
//! fetches `page_size` rows per read lock, and releases the lock before
//! yielding, so handlers consuming a stream may call back into the store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::event_store::{validate_batch, EventRecord, EventStore, EventStream};
use crate::events::{keys, DomainEvent};

const DEFAULT_PAGE_SIZE: usize = 256;

#[derive(Debug, Default)]
struct Tables {
    /// Rows in global sequence order; a row's index is its global sequence number
    records: Vec<EventRecord>,

    /// Unique index (aggregate id, sequence number) -> row index
    by_aggregate: HashMap<String, BTreeMap<i64, usize>>,

    next_surrogate_id: u64,
}

impl Tables {
    fn contains(&self, aggregate_root_id: &str, sequence_number: i64) -> bool {
        self.by_aggregate
            .get(aggregate_root_id)
            .is_some_and(|index| index.contains_key(&sequence_number))
    }
}

/// In-memory event store for tests and single-process deployments
#[derive(Debug, Clone)]
pub struct InMemoryEventStore {
    tables: Arc<RwLock<Tables>>,
    page_size: usize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store whose cursors fetch `page_size` rows per lock
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            page_size: page_size.max(1),
        }
    }

    /// Number of committed events
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored row, in global order
    pub fn records(&self) -> Vec<EventRecord> {
        self.tables.read().records.clone()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn save(&self, batch_id: Uuid, events: &mut [DomainEvent]) -> EventSourcingResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        validate_batch(batch_id, events)?;

        let mut tables = self.tables.write();

        let conflicting: Vec<DomainEvent> = events
            .iter()
            .filter(|event| {
                match (event.aggregate_root_id(), event.sequence_number()) {
                    (Some(id), Some(seq)) => tables.contains(id, seq),
                    _ => false,
                }
            })
            .cloned()
            .collect();

        if !conflicting.is_empty() {
            warn!(
                batch_id = %batch_id,
                conflicts = conflicting.len(),
                "Rejected batch on sequence number conflict"
            );
            return Err(EventSourcingError::Concurrency {
                batch_id,
                conflicting,
            });
        }

        let first_global = tables.records.len() as i64;
        let first_surrogate = tables.next_surrogate_id;

        // Encode everything before touching the tables so a codec failure
        // leaves the store unchanged
        let staged = events
            .iter()
            .enumerate()
            .map(|(offset, event)| {
                EventRecord::encode(
                    first_surrogate + offset as u64,
                    batch_id,
                    first_global + offset as i64,
                    event,
                )
            })
            .collect::<EventSourcingResult<Vec<_>>>()?;

        for record in staged {
            let row = record.global_sequence_number as usize;
            tables
                .by_aggregate
                .entry(record.aggregate_root_id.clone())
                .or_default()
                .insert(record.sequence_number, row);
            tables.records.push(record);
        }
        tables.next_surrogate_id = first_surrogate + events.len() as u64;
        drop(tables);

        for (offset, event) in events.iter_mut().enumerate() {
            event.metadata.insert(keys::BATCH_ID, batch_id);
            event
                .metadata
                .insert(keys::GLOBAL_SEQUENCE_NUMBER, first_global + offset as i64);
        }

        debug!(
            batch_id = %batch_id,
            events = events.len(),
            first_global_sequence_number = first_global,
            "Committed batch"
        );

        Ok(())
    }

    fn load(&self, aggregate_root_id: &str, first_sequence_number: i64) -> EventStream<'_> {
        let end = self
            .tables
            .read()
            .by_aggregate
            .get(aggregate_root_id)
            .and_then(|index| index.keys().next_back().copied())
            .map_or(0, |last| last + 1);

        Box::new(PagedCursor::new(
            Arc::clone(&self.tables),
            self.page_size,
            CursorRange::Aggregate {
                aggregate_root_id: aggregate_root_id.to_string(),
                next: first_sequence_number.max(0),
                end,
            },
        ))
    }

    fn stream(&self, from_global_sequence_number: i64) -> EventStream<'_> {
        let end = self.tables.read().records.len() as i64;

        Box::new(PagedCursor::new(
            Arc::clone(&self.tables),
            self.page_size,
            CursorRange::Global {
                next: from_global_sequence_number.max(0),
                end,
            },
        ))
    }

    fn next_global_sequence_number(&self) -> EventSourcingResult<i64> {
        Ok(self.tables.read().records.len() as i64)
    }

    fn drop_events(&self) -> EventSourcingResult<()> {
        let mut tables = self.tables.write();
        tables.records.clear();
        tables.by_aggregate.clear();
        debug!("Dropped all events");
        Ok(())
    }
}

/// Half-open range a cursor walks
#[derive(Debug)]
enum CursorRange {
    Aggregate {
        aggregate_root_id: String,
        next: i64,
        end: i64,
    },
    Global {
        next: i64,
        end: i64,
    },
}

struct PagedCursor {
    tables: Arc<RwLock<Tables>>,
    page_size: usize,
    range: CursorRange,
    buffer: VecDeque<EventSourcingResult<DomainEvent>>,
    exhausted: bool,
}

impl PagedCursor {
    fn new(tables: Arc<RwLock<Tables>>, page_size: usize, range: CursorRange) -> Self {
        Self {
            tables,
            page_size,
            range,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) {
        let tables = self.tables.read();

        let rows: Vec<&EventRecord> = match &mut self.range {
            CursorRange::Aggregate {
                aggregate_root_id,
                next,
                end,
            } => {
                let index = match tables.by_aggregate.get(aggregate_root_id.as_str()) {
                    Some(index) if *next < *end => index,
                    _ => {
                        self.exhausted = true;
                        return;
                    }
                };
                let rows: Vec<&EventRecord> = index
                    .range(*next..*end)
                    .take(self.page_size)
                    .filter_map(|(_, row)| tables.records.get(*row))
                    .collect();
                if let Some(last) = rows.last() {
                    *next = last.sequence_number + 1;
                }
                rows
            }
            CursorRange::Global { next, end } => {
                let start = (*next).min(*end) as usize;
                let stop = (*end as usize).min(start + self.page_size);
                let rows: Vec<&EventRecord> = tables
                    .records
                    .get(start..stop)
                    .map(|slice| slice.iter().collect())
                    .unwrap_or_default();
                *next = (start + rows.len()) as i64;
                rows
            }
        };

        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        self.buffer.extend(rows.into_iter().map(EventRecord::decode));
    }
}

impl Iterator for PagedCursor {
    type Item = EventSourcingResult<DomainEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page();
        }
        self.buffer.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(aggregate_root_id: &str, sequence_number: i64) -> DomainEvent {
        let mut event = DomainEvent::new("Touched", serde_json::json!({"n": sequence_number}));
        event.metadata.insert(keys::AGGREGATE_ROOT_ID, aggregate_root_id);
        event.metadata.insert(keys::OWNER, "Counter");
        event.metadata.insert(keys::SEQUENCE_NUMBER, sequence_number);
        event
    }

    #[test]
    fn test_save_assigns_global_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let mut first = vec![event("a", 0), event("a", 1)];
        let mut second = vec![event("b", 0)];

        store.save(Uuid::now_v7(), &mut first).unwrap();
        store.save(Uuid::now_v7(), &mut second).unwrap();

        assert_eq!(first[0].global_sequence_number(), Some(0));
        assert_eq!(first[1].global_sequence_number(), Some(1));
        assert_eq!(second[0].global_sequence_number(), Some(2));
        assert_eq!(store.next_global_sequence_number().unwrap(), 3);
    }

    #[test]
    fn test_conflict_rejects_whole_batch() {
        let store = InMemoryEventStore::new();
        store.save(Uuid::now_v7(), &mut [event("a", 0)]).unwrap();

        let batch_id = Uuid::now_v7();
        let mut batch = vec![event("b", 0), event("a", 0)];
        let err = store.save(batch_id, &mut batch).unwrap_err();

        match err {
            EventSourcingError::Concurrency {
                batch_id: rejected,
                conflicting,
            } => {
                assert_eq!(rejected, batch_id);
                assert_eq!(conflicting.len(), 1);
                assert_eq!(conflicting[0].aggregate_root_id(), Some("a"));
            }
            other => panic!("expected concurrency error, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("b", 0).count(), 0);
        assert_eq!(batch[0].global_sequence_number(), None);
        assert_eq!(batch[0].batch_id(), None);
    }

    #[test]
    fn test_cursor_pages_through_everything() {
        let store = InMemoryEventStore::with_page_size(2);
        let mut batch: Vec<DomainEvent> = (0..5).map(|seq| event("a", seq)).collect();
        store.save(Uuid::now_v7(), &mut batch).unwrap();

        let loaded: Vec<i64> = store
            .load("a", 1)
            .map(|e| e.unwrap().sequence_number().unwrap())
            .collect();
        assert_eq!(loaded, vec![1, 2, 3, 4]);

        let streamed: Vec<i64> = store
            .stream(3)
            .map(|e| e.unwrap().global_sequence_number().unwrap())
            .collect();
        assert_eq!(streamed, vec![3, 4]);
    }

    #[test]
    fn test_stream_is_finite_as_of_call() {
        let store = InMemoryEventStore::with_page_size(1);
        store.save(Uuid::now_v7(), &mut [event("a", 0)]).unwrap();

        let mut stream = store.stream(0);
        store.save(Uuid::now_v7(), &mut [event("a", 1)]).unwrap();

        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_drop_events_resets_positions() {
        let store = InMemoryEventStore::new();
        store.save(Uuid::now_v7(), &mut [event("a", 0)]).unwrap();

        store.drop_events().unwrap();

        assert!(store.is_empty());
        assert_eq!(store.next_global_sequence_number().unwrap(), 0);
        assert_eq!(store.load("a", 0).count(), 0);
    }
}
