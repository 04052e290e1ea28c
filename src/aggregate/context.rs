// Copyright (c) 2025 - Cowboy AI, Inc.
//! Apply context handed to aggregate handlers

use crate::aggregate::{Aggregate, AggregateRoot, Cutoff, ReplayState, UnitOfWork};
use crate::errors::EventSourcingResult;
use crate::events::DomainEvent;

/// What a handler may do besides mutating its own state
///
/// Nested loads go through the unit of work at the applying event's
/// position:
///
/// - a committed event replays them as of its global sequence number
/// - an emitted or buffered event at position `n` of the emit buffer sees
///   committed events plus the `n` buffered before it, which is what a
///   replay after commit will see
///
/// Aggregates loaded here are frozen and cannot be created.
pub struct ApplyContext<'u> {
    uow: &'u mut UnitOfWork,
    replay_state: ReplayState,
    aggregate_root_id: String,
    global_sequence_number: Option<i64>,
    cutoff: Cutoff,
}

impl<'u> ApplyContext<'u> {
    pub(crate) fn new(
        uow: &'u mut UnitOfWork,
        replay_state: ReplayState,
        aggregate_root_id: &str,
        event: &DomainEvent,
        cutoff: Cutoff,
    ) -> Self {
        Self {
            uow,
            replay_state,
            aggregate_root_id: aggregate_root_id.to_string(),
            global_sequence_number: event.global_sequence_number(),
            cutoff,
        }
    }

    pub fn replay_state(&self) -> ReplayState {
        self.replay_state
    }

    /// Id of the aggregate root the event is applied to
    pub fn aggregate_root_id(&self) -> &str {
        &self.aggregate_root_id
    }

    /// Global position of the applying event, `None` while it is being emitted
    pub fn global_sequence_number(&self) -> Option<i64> {
        self.global_sequence_number
    }

    /// Cutoff nested loads are hydrated at
    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    /// Load another aggregate as it was at this event's position
    ///
    /// Passing `create_if_not_exists = true` always fails with
    /// `IllegalState`: aggregates can only be created by live commands.
    pub fn load<B: AggregateRoot>(
        &mut self,
        aggregate_root_id: &str,
        create_if_not_exists: bool,
    ) -> EventSourcingResult<Aggregate<B>> {
        self.uow.load_with::<B>(
            aggregate_root_id,
            create_if_not_exists,
            self.replay_state,
            self.cutoff,
        )
    }

    /// Whether another aggregate existed at this event's position
    pub fn exists<B: AggregateRoot>(&mut self, aggregate_root_id: &str) -> EventSourcingResult<bool> {
        self.uow.exists_at::<B>(aggregate_root_id, self.cutoff)
    }
}
