// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event sourcing core for the Composable Information Machine
//!
//! This crate provides the write side and the catch-up read side of an
//! event-sourced system: an append-only event store with per-aggregate and
//! global ordering, aggregate hydration through a unit of work, and views
//! that follow the global stream with read-your-writes waiting.
//!
//! # Modules
//!
//! - [`event_store`]: the store contract and an in-memory implementation
//! - [`aggregate`]: aggregate roots, units of work and the repository
//! - [`projection`]: managed views and the catch-up dispatcher
//! - [`events`]: stored event envelope and metadata
//! - [`sequence`]: per-aggregate sequence allocation
//! - [`config`], [`telemetry`], [`errors`]: ambient plumbing

pub mod aggregate;
pub mod command;
pub mod config;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod projection;
pub mod sequence;
pub mod telemetry;

// Re-export commonly used types
pub use aggregate::{
    Aggregate, AggregateRoot, AggregateRootRepository, ApplyContext, Cutoff, EventHandlers,
    ReplayState, UnitOfWork,
};
pub use command::CommandResult;
pub use config::DispatcherConfig;
pub use errors::{EventSourcingError, EventSourcingResult};
pub use event_store::{EventStore, InMemoryEventStore};
pub use events::{DomainEvent, Event, Metadata};
pub use projection::{
    CatchUpDispatcher, CatchUpHandle, DispatchContext, InMemoryViewManager, ManagedView,
    ViewContext, ViewHandlers, ViewInstance,
};
pub use sequence::SequenceAllocator;
