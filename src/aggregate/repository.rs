// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Root Repository
//!
//! Hydrates aggregates by replaying their stream from the event store,
//! using the unit of work as cache and choosing the sequence allocator the
//! instance continues with.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::aggregate::{
    Aggregate, AggregateRoot, AggregateRootInfo, ApplyContext, Cutoff, EventHandlers, ReplayState,
    UnitOfWork,
};
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::event_store::EventStore;
use crate::events::DomainEvent;
use crate::sequence::SequenceAllocator;

pub struct AggregateRootRepository {
    store: Arc<dyn EventStore>,
    handlers: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl AggregateRootRepository {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Resolve and remember the handler table of `A`
    ///
    /// Called implicitly on first use; calling it up front moves the cost
    /// out of the first command.
    pub fn register<A: AggregateRoot>(&self) -> EventSourcingResult<Arc<EventHandlers<A>>> {
        let entry = self
            .handlers
            .write()
            .entry(TypeId::of::<A>())
            .or_insert_with(|| {
                let handlers = A::handlers();
                debug!(aggregate = A::TYPE_NAME, handlers = ?handlers, "Registered aggregate root");
                let entry: Arc<dyn Any + Send + Sync> = Arc::new(handlers);
                entry
            })
            .clone();

        Self::downcast::<A>(entry)
    }

    pub(crate) fn handlers<A: AggregateRoot>(&self) -> EventSourcingResult<Arc<EventHandlers<A>>> {
        let found = self.handlers.read().get(&TypeId::of::<A>()).cloned();
        match found {
            Some(entry) => Self::downcast::<A>(entry),
            None => self.register::<A>(),
        }
    }

    fn downcast<A: AggregateRoot>(
        entry: Arc<dyn Any + Send + Sync>,
    ) -> EventSourcingResult<Arc<EventHandlers<A>>> {
        entry.downcast::<EventHandlers<A>>().map_err(|_| {
            EventSourcingError::illegal_state(format!(
                "handler table registered for {} has a different aggregate type",
                A::TYPE_NAME
            ))
        })
    }

    /// Return `A` from the unit of work, hydrating it on a cache miss
    ///
    /// `replay_state` is the state of whoever asks: live commands pass
    /// `None`, nested loads pass the applying aggregate's state. Only a live
    /// load at [`Cutoff::Live`] gets a live sequence allocator.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if `create_if_not_exists` is set while replaying or emitting
    /// - `NotFound` if nothing is visible at `cutoff` and creation is not requested
    pub fn get<A: AggregateRoot>(
        &self,
        uow: &mut UnitOfWork,
        aggregate_root_id: &str,
        create_if_not_exists: bool,
        replay_state: ReplayState,
        cutoff: Cutoff,
    ) -> EventSourcingResult<Aggregate<A>> {
        if create_if_not_exists && replay_state != ReplayState::None {
            return Err(EventSourcingError::illegal_state(format!(
                "cannot create {} '{}' while in {:?}; aggregates are only created by live commands",
                A::TYPE_NAME,
                aggregate_root_id,
                replay_state
            )));
        }

        if let Some(cached) = uow.cached::<A>(aggregate_root_id, cutoff)? {
            return Ok(cached);
        }

        let handlers = self.handlers::<A>()?;
        let mut info = AggregateRootInfo::<A>::new(aggregate_root_id, cutoff);

        info.set_replay_state(ReplayState::ReplayApply);
        let replayed = self.replay_history(uow, &handlers, &mut info, cutoff);
        info.set_replay_state(ReplayState::None);
        replayed?;

        if info.last_sequence_number() < 0 && !create_if_not_exists {
            return Err(EventSourcingError::NotFound {
                aggregate_type: A::TYPE_NAME.to_string(),
                aggregate_root_id: aggregate_root_id.to_string(),
            });
        }

        let allocator = match cutoff {
            Cutoff::Live => {
                SequenceAllocator::for_replay_state(replay_state, info.last_sequence_number())
            }
            Cutoff::AsOf(_) | Cutoff::Pending(_) => SequenceAllocator::frozen(),
        };
        info.set_allocator(allocator);

        debug!(
            aggregate = A::TYPE_NAME,
            aggregate_root_id,
            cutoff = ?cutoff,
            last_sequence_number = info.last_sequence_number(),
            last_global_sequence_number = info.last_global_sequence_number(),
            frozen = allocator.is_frozen(),
            "Hydrated aggregate root"
        );

        let aggregate = Aggregate::new(info);
        uow.insert_cached(&aggregate, cutoff);
        Ok(aggregate)
    }

    /// Whether `aggregate_root_id` had its first event at or before
    /// `max_global_sequence_number`
    pub fn exists<A: AggregateRoot>(
        &self,
        aggregate_root_id: &str,
        max_global_sequence_number: i64,
    ) -> EventSourcingResult<bool> {
        let Some(first) = self.store.load(aggregate_root_id, 0).next() else {
            return Ok(false);
        };
        let first = first?;

        let owned_by_a = first
            .metadata
            .owner()
            .map_or(true, |owner| owner == A::TYPE_NAME);
        let visible = first
            .global_sequence_number()
            .is_some_and(|global| global <= max_global_sequence_number);

        Ok(owned_by_a && visible && first.sequence_number() == Some(0))
    }

    fn replay_history<A: AggregateRoot>(
        &self,
        uow: &mut UnitOfWork,
        handlers: &EventHandlers<A>,
        info: &mut AggregateRootInfo<A>,
        cutoff: Cutoff,
    ) -> EventSourcingResult<()> {
        let max_global = cutoff.max_global_sequence_number();

        for loaded in self.store.load(info.aggregate_root_id(), 0) {
            let event = loaded?;
            let global = event.metadata.require_global_sequence_number()?;
            if global > max_global {
                break;
            }
            self.replay_event(uow, handlers, info, &event, Cutoff::AsOf(global))?;
        }

        if let Cutoff::Pending(visible) = cutoff {
            let pending = uow.pending_events(A::TYPE_NAME, info.aggregate_root_id(), visible);
            for (position, event) in pending {
                self.replay_event(uow, handlers, info, &event, Cutoff::Pending(position))?;
            }
        }

        Ok(())
    }

    fn replay_event<A: AggregateRoot>(
        &self,
        uow: &mut UnitOfWork,
        handlers: &EventHandlers<A>,
        info: &mut AggregateRootInfo<A>,
        event: &DomainEvent,
        nested: Cutoff,
    ) -> EventSourcingResult<()> {
        if let Some(owner) = event.metadata.owner() {
            if owner != A::TYPE_NAME {
                return Err(EventSourcingError::illegal_state(format!(
                    "aggregate root '{}' is a {}, not a {}",
                    info.aggregate_root_id(),
                    owner,
                    A::TYPE_NAME
                )));
            }
        }

        let sequence_number = event.metadata.require_sequence_number()?;
        if sequence_number != info.last_sequence_number() + 1 {
            return Err(EventSourcingError::illegal_state(format!(
                "aggregate root '{}' replayed sequence number {} after {}",
                info.aggregate_root_id(),
                sequence_number,
                info.last_sequence_number()
            )));
        }

        trace!(
            aggregate_root_id = info.aggregate_root_id(),
            event_type = event.event_type(),
            sequence_number,
            "Replaying event"
        );

        let aggregate_root_id = info.aggregate_root_id().to_string();
        let mut ctx = ApplyContext::new(
            uow,
            ReplayState::ReplayApply,
            &aggregate_root_id,
            event,
            nested,
        );
        handlers.apply(info.root_mut(), event, &mut ctx)?;

        info.advance(sequence_number, event.global_sequence_number());
        Ok(())
    }
}

impl std::fmt::Debug for AggregateRootRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRootRepository")
            .field("registered", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::events::Event;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default)]
    struct Lamp;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct SwitchedOn;

    impl Event for SwitchedOn {
        const EVENT_TYPE: &'static str = "SwitchedOn";
    }

    impl AggregateRoot for Lamp {
        const TYPE_NAME: &'static str = "Lamp";

        fn create(_aggregate_root_id: &str) -> Self {
            Self
        }

        fn handlers() -> EventHandlers<Self> {
            EventHandlers::new().on(|_lamp: &mut Lamp, _event: SwitchedOn| {})
        }
    }

    #[test]
    fn test_register_resolves_the_table_once() {
        let repository = AggregateRootRepository::new(Arc::new(InMemoryEventStore::new()));

        let first = repository.register::<Lamp>().unwrap();
        let second = repository.register::<Lamp>().unwrap();
        let implicit = repository.handlers::<Lamp>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &implicit));
        assert!(first.handles(SwitchedOn::EVENT_TYPE));
    }

    #[test]
    fn test_mismatched_table_is_reported() {
        let repository = AggregateRootRepository::new(Arc::new(InMemoryEventStore::new()));
        let wrong: Arc<dyn Any + Send + Sync> = Arc::new(String::from("not a handler table"));
        repository.handlers.write().insert(TypeId::of::<Lamp>(), wrong);

        let outcome = repository.handlers::<Lamp>();

        assert!(matches!(outcome, Err(EventSourcingError::IllegalState(_))));
    }
}
