// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Event Store Ordering

use std::collections::HashMap;

use cim_event_store::event_store::{EventStore, InMemoryEventStore};
use cim_event_store::events::{keys, DomainEvent};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

// ============================================================================
// Strategies
// ============================================================================

/// A batch is a list of aggregate indexes; each occurrence takes that
/// aggregate's next sequence number
fn batches() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..4, 1..6), 1..20)
}

fn page_size() -> impl Strategy<Value = usize> {
    1usize..8
}

fn save_all(store: &InMemoryEventStore, batches: &[Vec<usize>]) -> HashMap<String, i64> {
    let mut next: HashMap<String, i64> = HashMap::new();

    for batch in batches {
        let mut events: Vec<DomainEvent> = batch
            .iter()
            .map(|index| {
                let id = format!("aggregate-{}", index);
                let seq = next.entry(id.clone()).or_insert(0);
                let mut event = DomainEvent::new("Noted", json!({ "seq": *seq }));
                event.metadata.insert(keys::AGGREGATE_ROOT_ID, id.as_str());
                event.metadata.insert(keys::SEQUENCE_NUMBER, *seq);
                *seq += 1;
                event
            })
            .collect();
        store
            .save(Uuid::now_v7(), &mut events)
            .expect("generated batches are valid");
    }

    next
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: the global stream is gap-free and strictly increasing
    #[test]
    fn prop_global_stream_is_dense(batches in batches(), page in page_size()) {
        let store = InMemoryEventStore::with_page_size(page);
        save_all(&store, &batches);

        let globals: Vec<i64> = store
            .stream(0)
            .map(|event| event.unwrap().global_sequence_number().unwrap())
            .collect();
        let total: usize = batches.iter().map(Vec::len).sum();

        prop_assert_eq!(globals, (0..total as i64).collect::<Vec<_>>());
        prop_assert_eq!(store.next_global_sequence_number().unwrap(), total as i64);
    }

    /// Property: loading an aggregate yields 0, 1, 2, ... with increasing globals
    #[test]
    fn prop_load_is_contiguous(batches in batches(), page in page_size()) {
        let store = InMemoryEventStore::with_page_size(page);
        let counts = save_all(&store, &batches);

        for (id, count) in counts {
            let loaded: Vec<DomainEvent> = store
                .load(&id, 0)
                .collect::<Result<_, _>>()
                .unwrap();

            let sequence: Vec<i64> = loaded.iter().filter_map(DomainEvent::sequence_number).collect();
            prop_assert_eq!(sequence, (0..count).collect::<Vec<_>>());

            let globals: Vec<i64> = loaded
                .iter()
                .filter_map(DomainEvent::global_sequence_number)
                .collect();
            prop_assert!(globals.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    /// Property: events of one batch occupy a contiguous run of the stream
    #[test]
    fn prop_batches_are_contiguous_in_the_stream(batches in batches()) {
        let store = InMemoryEventStore::new();
        save_all(&store, &batches);

        let ids: Vec<Uuid> = store
            .stream(0)
            .map(|event| event.unwrap().batch_id().unwrap())
            .collect();

        let mut runs = ids.clone();
        runs.dedup();
        prop_assert_eq!(runs.len(), batches.len());
    }
}
