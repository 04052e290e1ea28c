// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Dispatch Grouping

use cim_event_store::events::{keys, DomainEvent};
use cim_event_store::projection::catch_up::group_batches;
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

/// Run lengths of consecutive events; `None` runs carry no batch id
fn runs() -> impl Strategy<Value = Vec<(bool, usize)>> {
    prop::collection::vec((any::<bool>(), 1usize..6), 0..10)
}

fn page(runs: &[(bool, usize)]) -> Vec<DomainEvent> {
    let mut global = 0_i64;
    let mut events = Vec::new();
    for (batched, len) in runs {
        let batch_id = batched.then(Uuid::now_v7);
        for _ in 0..*len {
            let mut event = DomainEvent::new("Noted", json!({}));
            event.metadata.insert(keys::GLOBAL_SEQUENCE_NUMBER, global);
            if let Some(batch_id) = batch_id {
                event.metadata.insert(keys::BATCH_ID, batch_id);
            }
            events.push(event);
            global += 1;
        }
    }
    events
}

proptest! {
    /// Property: grouping keeps every event, in order
    #[test]
    fn prop_grouping_preserves_order(runs in runs(), max in 1usize..5) {
        let events = page(&runs);
        let expected: Vec<i64> = (0..events.len() as i64).collect();

        let flattened: Vec<i64> = group_batches(events, max)
            .into_iter()
            .flatten()
            .filter_map(|event| event.global_sequence_number())
            .collect();

        prop_assert_eq!(flattened, expected);
    }

    /// Property: a group never mixes batches, and unbatched groups stay small
    #[test]
    fn prop_groups_are_homogeneous(runs in runs(), max in 1usize..5) {
        for group in group_batches(page(&runs), max) {
            let first = group[0].batch_id();
            prop_assert!(group.iter().all(|event| event.batch_id() == first));
            if first.is_none() {
                prop_assert!(group.len() <= max);
            }
        }
    }
}
