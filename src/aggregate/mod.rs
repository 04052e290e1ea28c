// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Roots
//!
//! Aggregates are in-memory domain objects rebuilt by replaying their event
//! stream and mutated only by emitting new events.
//!
//! # Flow
//!
//! ```text
//! UnitOfWork::get ──> Repository ──load(id)──> EventStore
//!        │                 │
//!        │                 └── replay each event (ReplayApply) through EventHandlers
//!        ▼
//! Aggregate::emit ──> stamp metadata ──> apply (EmitApply) ──> emit buffer
//!        │
//!        ▼
//! UnitOfWork::commit ──save(batch)──> EventStore ──> CommandResult
//! ```
//!
//! # Replay state
//!
//! [`ReplayState`] says why an apply handler is running. It is an explicit
//! per-instance field, set around every apply and always restored to
//! `None` afterwards, success or failure.
//!
//! - `None`: idle; emitting and creating are allowed
//! - `EmitApply`: applying a freshly emitted event
//! - `ReplayApply`: applying a stored event during hydration
//!
//! Handlers may load other aggregates through their [`ApplyContext`]. Those
//! nested loads are hydrated only up to the applying event's global position
//! and carry a frozen sequence allocator, so replaying an aggregate always
//! reconstructs exactly what it saw when the event was first emitted.
//!
//! # Example
//!
//! ```rust
//! use cim_event_store::aggregate::{AggregateRoot, AggregateRootRepository, EventHandlers, UnitOfWork};
//! use cim_event_store::event_store::InMemoryEventStore;
//! use cim_event_store::events::Event;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Incremented { by: i64 }
//!
//! impl Event for Incremented {
//!     const EVENT_TYPE: &'static str = "Incremented";
//! }
//!
//! struct Counter { value: i64 }
//!
//! impl AggregateRoot for Counter {
//!     const TYPE_NAME: &'static str = "Counter";
//!
//!     fn create(_id: &str) -> Self {
//!         Counter { value: 0 }
//!     }
//!
//!     fn handlers() -> EventHandlers<Self> {
//!         EventHandlers::new().on(|counter: &mut Counter, event: Incremented| counter.value += event.by)
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = Arc::new(AggregateRootRepository::new(Arc::new(InMemoryEventStore::new())));
//!
//! let mut uow = UnitOfWork::new(Arc::clone(&repository));
//! let counter = uow.get::<Counter>("counter-1", true)?;
//! counter.emit(&mut uow, Incremented { by: 2 })?;
//! let result = uow.commit()?;
//!
//! assert_eq!(result.highest_global_sequence_number(), Some(0));
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod handlers;
pub mod repository;
pub mod unit_of_work;

pub use context::ApplyContext;
pub use handlers::EventHandlers;
pub use repository::AggregateRootRepository;
pub use unit_of_work::{Aggregate, AggregateRootInfo, Cutoff, UnitOfWork};

/// Why an apply handler is currently executing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReplayState {
    /// Not applying anything
    #[default]
    None,
    /// Applying an event that is being emitted right now
    EmitApply,
    /// Applying a stored event while hydrating
    ReplayApply,
}

/// An event-sourced aggregate root
///
/// The handler table returned by [`AggregateRoot::handlers`] is the
/// aggregate's capability set: it may only emit event types it handles.
/// The table is built once per type by the repository.
pub trait AggregateRoot: Sized + 'static {
    /// Owner type name stamped into every emitted event
    const TYPE_NAME: &'static str;

    /// A fresh, empty instance for `aggregate_root_id`
    fn create(aggregate_root_id: &str) -> Self;

    /// Typed apply handlers, keyed by event type
    fn handlers() -> EventHandlers<Self>;
}
