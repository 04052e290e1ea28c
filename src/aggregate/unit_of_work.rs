// Copyright (c) 2025 - Cowboy AI, Inc.
//! Unit of Work
//!
//! Scope of a single command: caches hydrated aggregates and buffers the
//! events they emit until [`UnitOfWork::commit`] saves them as one batch.
//!
//! The cache is keyed by (type, id, cutoff), so the same aggregate can be
//! held both live and as a frozen historical view inside one unit of work.
//! A unit of work is single-threaded (`!Send`) and discarded after the
//! command; it is never persisted.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::aggregate::{AggregateRoot, AggregateRootRepository, ApplyContext, ReplayState};
use crate::command::CommandResult;
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::events::{keys, DomainEvent, Event};
use crate::sequence::SequenceAllocator;

/// Global position an aggregate was hydrated up to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cutoff {
    /// Current state, for live command execution
    Live,
    /// Only events with a global sequence number at or below the value
    AsOf(i64),
    /// Committed events plus the first `n` events buffered in this unit of
    /// work
    ///
    /// The buffer only grows, so an instance hydrated at `Pending(n)` never
    /// goes stale.
    Pending(usize),
}

impl Cutoff {
    /// Highest committed global sequence number visible at this cutoff
    pub fn max_global_sequence_number(&self) -> i64 {
        match self {
            Cutoff::AsOf(max) => *max,
            Cutoff::Live | Cutoff::Pending(_) => i64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    type_name: &'static str,
    aggregate_root_id: String,
    cutoff: Cutoff,
}

/// Hydration result: the rebuilt instance and how far it was replayed
pub struct AggregateRootInfo<A> {
    root: A,
    aggregate_root_id: String,
    last_sequence_number: i64,
    last_global_sequence_number: i64,
    cutoff: Cutoff,
    allocator: SequenceAllocator,
    replay_state: ReplayState,
    poisoned: bool,
}

impl<A: AggregateRoot> AggregateRootInfo<A> {
    pub(crate) fn new(aggregate_root_id: &str, cutoff: Cutoff) -> Self {
        Self {
            root: A::create(aggregate_root_id),
            aggregate_root_id: aggregate_root_id.to_string(),
            last_sequence_number: -1,
            last_global_sequence_number: -1,
            cutoff,
            allocator: SequenceAllocator::frozen(),
            replay_state: ReplayState::None,
            poisoned: false,
        }
    }
}

impl<A> AggregateRootInfo<A> {
    pub fn root(&self) -> &A {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut A {
        &mut self.root
    }

    pub fn aggregate_root_id(&self) -> &str {
        &self.aggregate_root_id
    }

    /// Last applied per-aggregate sequence number, -1 if none
    pub fn last_sequence_number(&self) -> i64 {
        self.last_sequence_number
    }

    /// Last applied global sequence number, -1 if none
    pub fn last_global_sequence_number(&self) -> i64 {
        self.last_global_sequence_number
    }

    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    pub fn replay_state(&self) -> ReplayState {
        self.replay_state
    }

    pub(crate) fn set_replay_state(&mut self, replay_state: ReplayState) {
        self.replay_state = replay_state;
    }

    pub(crate) fn set_allocator(&mut self, allocator: SequenceAllocator) {
        self.allocator = allocator;
    }

    /// Record that `event` was replayed
    pub(crate) fn advance(&mut self, sequence_number: i64, global_sequence_number: Option<i64>) {
        self.last_sequence_number = sequence_number;
        if let Some(global) = global_sequence_number {
            self.last_global_sequence_number = global;
        }
    }
}

/// Shared handle to an aggregate cached in a unit of work
pub struct Aggregate<A> {
    aggregate_root_id: String,
    inner: Rc<RefCell<AggregateRootInfo<A>>>,
}

impl<A> Clone for Aggregate<A> {
    fn clone(&self) -> Self {
        Self {
            aggregate_root_id: self.aggregate_root_id.clone(),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Aggregate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("aggregate_root_id", &self.aggregate_root_id)
            .finish_non_exhaustive()
    }
}

impl<A: AggregateRoot> Aggregate<A> {
    pub(crate) fn new(info: AggregateRootInfo<A>) -> Self {
        Self {
            aggregate_root_id: info.aggregate_root_id.clone(),
            inner: Rc::new(RefCell::new(info)),
        }
    }

    pub fn id(&self) -> &str {
        &self.aggregate_root_id
    }

    /// Borrow the aggregate state
    ///
    /// # Panics
    ///
    /// If called from inside this same aggregate's apply handler.
    pub fn state(&self) -> Ref<'_, A> {
        Ref::map(self.inner.borrow(), AggregateRootInfo::root)
    }

    /// Borrow the full hydration info
    pub fn info(&self) -> Ref<'_, AggregateRootInfo<A>> {
        self.inner.borrow()
    }

    pub fn read<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.borrow().root)
    }

    pub fn last_sequence_number(&self) -> i64 {
        self.inner.borrow().last_sequence_number
    }

    pub fn last_global_sequence_number(&self) -> i64 {
        self.inner.borrow().last_global_sequence_number
    }

    /// No events have been applied yet
    pub fn is_new(&self) -> bool {
        self.last_sequence_number() < 0
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().allocator.is_frozen()
    }

    /// Emit `event` from this aggregate into `uow`
    pub fn emit<E: Event>(&self, uow: &mut UnitOfWork, event: E) -> EventSourcingResult<()> {
        uow.emit(self, event)
    }
}

/// Per-command cache and emit buffer
pub struct UnitOfWork {
    repository: Arc<AggregateRootRepository>,
    cache: HashMap<CacheKey, Rc<dyn Any>>,
    emitted: Vec<DomainEvent>,
    aborted: Option<String>,
}

impl UnitOfWork {
    pub fn new(repository: Arc<AggregateRootRepository>) -> Self {
        Self {
            repository,
            cache: HashMap::new(),
            emitted: Vec::new(),
            aborted: None,
        }
    }

    pub fn repository(&self) -> &Arc<AggregateRootRepository> {
        &self.repository
    }

    /// Load an aggregate for live command execution
    ///
    /// # Errors
    ///
    /// - `NotFound` if no events exist and `create_if_not_exists` is false
    /// - `IllegalState` if the stored events belong to another aggregate type
    pub fn get<A: AggregateRoot>(
        &mut self,
        aggregate_root_id: &str,
        create_if_not_exists: bool,
    ) -> EventSourcingResult<Aggregate<A>> {
        self.load_with(
            aggregate_root_id,
            create_if_not_exists,
            ReplayState::None,
            Cutoff::Live,
        )
    }

    /// Load a frozen view of an aggregate as of `max_global_sequence_number`
    pub fn load_as_of<A: AggregateRoot>(
        &mut self,
        aggregate_root_id: &str,
        max_global_sequence_number: i64,
    ) -> EventSourcingResult<Aggregate<A>> {
        self.load_with(
            aggregate_root_id,
            false,
            ReplayState::None,
            Cutoff::AsOf(max_global_sequence_number),
        )
    }

    /// Whether the aggregate exists, including creations buffered here
    pub fn exists<A: AggregateRoot>(&self, aggregate_root_id: &str) -> EventSourcingResult<bool> {
        self.exists_at::<A>(aggregate_root_id, Cutoff::Live)
    }

    pub(crate) fn load_with<A: AggregateRoot>(
        &mut self,
        aggregate_root_id: &str,
        create_if_not_exists: bool,
        replay_state: ReplayState,
        cutoff: Cutoff,
    ) -> EventSourcingResult<Aggregate<A>> {
        let repository = Arc::clone(&self.repository);
        repository.get(self, aggregate_root_id, create_if_not_exists, replay_state, cutoff)
    }

    pub(crate) fn exists_at<A: AggregateRoot>(
        &self,
        aggregate_root_id: &str,
        cutoff: Cutoff,
    ) -> EventSourcingResult<bool> {
        let buffered = match cutoff {
            Cutoff::Live => self.emitted.len(),
            Cutoff::Pending(visible) => visible.min(self.emitted.len()),
            Cutoff::AsOf(_) => 0,
        };
        let created_here = self.emitted[..buffered].iter().any(|event| {
            event.aggregate_root_id() == Some(aggregate_root_id)
                && event.metadata.owner() == Some(A::TYPE_NAME)
                && event.sequence_number() == Some(0)
        });
        if created_here {
            return Ok(true);
        }
        self.repository
            .exists::<A>(aggregate_root_id, cutoff.max_global_sequence_number())
    }

    /// Emit `event` from `target`
    ///
    /// Checks the capability set, identity and replay state, stamps the
    /// metadata, applies the event in `EmitApply` and buffers it. A failing
    /// handler leaves the aggregate and this unit of work unusable.
    pub fn emit<A: AggregateRoot, E: Event>(
        &mut self,
        target: &Aggregate<A>,
        event: E,
    ) -> EventSourcingResult<()> {
        let handlers = self.repository.handlers::<A>()?;
        if !handlers.handles(E::EVENT_TYPE) {
            return Err(EventSourcingError::illegal_state(format!(
                "{} cannot emit {}: no handler registered for it",
                A::TYPE_NAME,
                E::EVENT_TYPE
            )));
        }
        if let Some(reason) = &self.aborted {
            return Err(EventSourcingError::illegal_state(format!(
                "unit of work was aborted: {}",
                reason
            )));
        }

        let mut guard = target.inner.try_borrow_mut().map_err(|_| {
            EventSourcingError::illegal_state(format!(
                "aggregate root '{}' is applying an event and cannot emit",
                target.id()
            ))
        })?;
        let info = &mut *guard;

        if info.aggregate_root_id.trim().is_empty() {
            return Err(EventSourcingError::illegal_state(format!(
                "cannot emit {} from a {} without an id",
                E::EVENT_TYPE,
                A::TYPE_NAME
            )));
        }
        if info.poisoned {
            return Err(EventSourcingError::illegal_state(format!(
                "aggregate root '{}' failed a previous apply and must not be used",
                info.aggregate_root_id
            )));
        }
        if info.replay_state != ReplayState::None {
            return Err(EventSourcingError::illegal_state(format!(
                "aggregate root '{}' cannot emit {} while in {:?}",
                info.aggregate_root_id,
                E::EVENT_TYPE,
                info.replay_state
            )));
        }

        let mut domain_event = DomainEvent::from_event(&event)?;
        let sequence_number = info.allocator.next(&info.aggregate_root_id)?;
        domain_event
            .metadata
            .insert(keys::AGGREGATE_ROOT_ID, info.aggregate_root_id.as_str());
        domain_event.metadata.insert(keys::OWNER, A::TYPE_NAME);
        domain_event
            .metadata
            .insert(keys::SEQUENCE_NUMBER, sequence_number);
        domain_event.metadata.stamp_time(Utc::now());

        // Nested loads see what a replay at this event's position will see:
        // everything committed plus the events buffered before it
        let nested = Cutoff::Pending(self.emitted.len());
        info.replay_state = ReplayState::EmitApply;
        let applied = {
            let mut ctx = ApplyContext::new(
                self,
                ReplayState::EmitApply,
                &info.aggregate_root_id,
                &domain_event,
                nested,
            );
            handlers.apply(&mut info.root, &domain_event, &mut ctx)
        };
        info.replay_state = ReplayState::None;

        if let Err(err) = applied {
            info.poisoned = true;
            self.aborted = Some(err.to_string());
            return Err(err);
        }

        info.last_sequence_number = sequence_number;
        drop(guard);

        self.emitted.push(domain_event);

        Ok(())
    }

    /// Events emitted so far, in emit order
    pub fn emitted_events(&self) -> &[DomainEvent] {
        &self.emitted
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Save every buffered event as one batch and discard the unit of work
    ///
    /// # Errors
    ///
    /// - `IllegalState` if a handler failed during this unit of work
    /// - `Concurrency` if another writer took one of the sequence numbers;
    ///   run the command again against fresh state to retry
    pub fn commit(mut self) -> EventSourcingResult<CommandResult> {
        if let Some(reason) = self.aborted.take() {
            return Err(EventSourcingError::illegal_state(format!(
                "cannot commit an aborted unit of work: {}",
                reason
            )));
        }
        if self.emitted.is_empty() {
            return Ok(CommandResult::empty());
        }

        let batch_id = Uuid::now_v7();
        self.repository.store().save(batch_id, &mut self.emitted)?;

        let global_sequence_numbers: Vec<i64> = self
            .emitted
            .iter()
            .filter_map(DomainEvent::global_sequence_number)
            .collect();

        debug!(
            batch_id = %batch_id,
            events = global_sequence_numbers.len(),
            "Committed unit of work"
        );

        Ok(CommandResult::new(batch_id, global_sequence_numbers))
    }

    pub(crate) fn cached<A: AggregateRoot>(
        &self,
        aggregate_root_id: &str,
        cutoff: Cutoff,
    ) -> EventSourcingResult<Option<Aggregate<A>>> {
        let key = CacheKey {
            type_name: A::TYPE_NAME,
            aggregate_root_id: aggregate_root_id.to_string(),
            cutoff,
        };
        let Some(entry) = self.cache.get(&key) else {
            return Ok(None);
        };

        let inner = Rc::clone(entry)
            .downcast::<RefCell<AggregateRootInfo<A>>>()
            .map_err(|_| {
                EventSourcingError::illegal_state(format!(
                    "aggregate type name {} is registered by more than one type",
                    A::TYPE_NAME
                ))
            })?;

        Ok(Some(Aggregate {
            aggregate_root_id: aggregate_root_id.to_string(),
            inner,
        }))
    }

    pub(crate) fn insert_cached<A: AggregateRoot>(&mut self, aggregate: &Aggregate<A>, cutoff: Cutoff) {
        let key = CacheKey {
            type_name: A::TYPE_NAME,
            aggregate_root_id: aggregate.aggregate_root_id.clone(),
            cutoff,
        };
        let entry: Rc<dyn Any> = aggregate.inner.clone();
        self.cache.insert(key, entry);
    }

    /// Buffered events of one aggregate among the first `visible`, with
    /// their position in the emit buffer
    pub(crate) fn pending_events(
        &self,
        type_name: &str,
        aggregate_root_id: &str,
        visible: usize,
    ) -> Vec<(usize, DomainEvent)> {
        self.emitted
            .iter()
            .enumerate()
            .take(visible)
            .filter(|(_, event)| {
                event.aggregate_root_id() == Some(aggregate_root_id)
                    && event.metadata.owner() == Some(type_name)
            })
            .map(|(position, event)| (position, event.clone()))
            .collect()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("cached", &self.cache.len())
            .field("emitted", &self.emitted.len())
            .field("aborted", &self.aborted)
            .finish()
    }
}
