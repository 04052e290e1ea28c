// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Store Abstraction
//!
//! This module defines the append-only, globally ordered event log that every
//! other component builds on.
//!
//! # Architecture
//!
//! ```text
//! UnitOfWork ──save(batch)──> EventStore ──load(id)────> Repository (hydration)
//!                                  │
//!                                  └──stream(from)──> CatchUpDispatcher (views)
//! ```
//!
//! # Event Store Requirements
//!
//! 1. **Atomic batches**: a batch is committed entirely or not at all
//! 2. **Per-aggregate order**: (aggregate id, sequence number) is unique
//! 3. **Global order**: global sequence numbers are unique and strictly
//!    increasing in commit order, assigned inside the same transaction as the
//!    uniqueness check so a losing writer sees a conflict, never a reordering
//! 4. **No retry**: a conflict fails the whole batch with
//!    [`EventSourcingError::Concurrency`]; the caller decides whether to
//!    recompute sequence numbers and try again
//!
//! # Reference relational layout
//!
//! One row per event (see [`record::EventRecord`]): surrogate id, batch id,
//! aggregate id, sequence number, global sequence number, metadata blob,
//! payload blob; unique indexes on (aggregate id, sequence number) and on
//! global sequence number.

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::events::DomainEvent;

pub mod memory;
pub mod record;

pub use memory::InMemoryEventStore;
pub use record::EventRecord;

/// Lazy, finite sequence of events
///
/// Stores may fail part way through; each item is a `Result`.
pub type EventStream<'a> = Box<dyn Iterator<Item = EventSourcingResult<DomainEvent>> + Send + 'a>;

/// Event Store contract
///
/// Calls are synchronous: aggregate hydration replays events, including
/// nested loads, on the caller's execution path without suspending. Async
/// callers such as the catch-up dispatcher move store calls onto blocking
/// threads.
pub trait EventStore: Send + Sync {
    /// Commit `events` atomically under `batch_id`
    ///
    /// On success every event carries the batch id and its assigned global
    /// sequence number in its metadata.
    ///
    /// # Errors
    ///
    /// - `Concurrency` if any (aggregate id, sequence number) is already taken
    /// - `IllegalState` if the batch fails integrity validation
    /// - `Storage` / `Serialization` for anything else
    fn save(&self, batch_id: Uuid, events: &mut [DomainEvent]) -> EventSourcingResult<()>;

    /// Events of one aggregate ordered by sequence number, from `first_sequence_number`
    fn load(&self, aggregate_root_id: &str, first_sequence_number: i64) -> EventStream<'_>;

    /// All events ordered by global sequence number, from `from_global_sequence_number`
    ///
    /// The stream ends at the head as of the call.
    fn stream(&self, from_global_sequence_number: i64) -> EventStream<'_>;

    /// The global sequence number the next committed event would get
    ///
    /// Advisory only: another writer may commit before the caller does.
    fn next_global_sequence_number(&self) -> EventSourcingResult<i64>;

    /// Delete every event. Test and bootstrap use only.
    fn drop_events(&self) -> EventSourcingResult<()>;
}

/// Check batch integrity without touching the events
///
/// Every event must carry an aggregate root id and a non-negative sequence
/// number, and the sequence numbers of each aggregate inside the batch must
/// be contiguous. Any batch id an event already carries is replaced by
/// `batch_id` on commit, so a rejected batch can be retried under a new one.
pub fn validate_batch(batch_id: Uuid, events: &[DomainEvent]) -> EventSourcingResult<()> {
    let mut last_seen: HashMap<&str, i64> = HashMap::new();
    for event in events.iter() {
        let aggregate_root_id = event.metadata.require_aggregate_root_id()?;
        let sequence_number = event.metadata.require_sequence_number()?;

        if sequence_number < 0 {
            return Err(EventSourcingError::illegal_state(format!(
                "negative sequence number {} for aggregate root '{}'",
                sequence_number, aggregate_root_id
            )));
        }

        if let Some(previous) = last_seen.insert(aggregate_root_id, sequence_number) {
            if sequence_number != previous + 1 {
                return Err(EventSourcingError::illegal_state(format!(
                    "sequence numbers for aggregate root '{}' are not contiguous in batch {}: {} follows {}",
                    aggregate_root_id, batch_id, sequence_number, previous
                )));
            }
        }
    }

    Ok(())
}
