// Copyright (c) 2025 - Cowboy AI, Inc.
//! View instances and their typed subscriptions

use std::collections::HashMap;
use std::fmt;

use anyhow::Context as _;

use crate::aggregate::{Aggregate, AggregateRoot, UnitOfWork};
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::events::{DomainEvent, Event};
use crate::projection::ViewLocator;

/// One read model, instantiated per id chosen by its locator
pub trait ViewInstance: Clone + Send + Sync + 'static {
    /// Decides which instances an event is delivered to
    type Locator: ViewLocator;

    /// Blank instance for `view_id`
    fn create(view_id: &str) -> Self;

    /// Events this view subscribes to
    fn handlers() -> ViewHandlers<Self>;
}

/// Passed to view handlers for the event being applied
pub struct ViewContext<'a> {
    view_id: &'a str,
    event: &'a DomainEvent,
    uow: Option<&'a mut UnitOfWork>,
}

impl<'a> ViewContext<'a> {
    pub(crate) fn new(
        view_id: &'a str,
        event: &'a DomainEvent,
        uow: Option<&'a mut UnitOfWork>,
    ) -> Self {
        Self {
            view_id,
            event,
            uow,
        }
    }

    pub fn view_id(&self) -> &str {
        self.view_id
    }

    /// The stored event, with its metadata
    pub fn event(&self) -> &DomainEvent {
        self.event
    }

    pub fn aggregate_root_id(&self) -> Option<&str> {
        self.event.aggregate_root_id()
    }

    pub fn global_sequence_number(&self) -> Option<i64> {
        self.event.global_sequence_number()
    }

    /// Load an aggregate as it was when this event was committed
    ///
    /// Hydration reads the event store synchronously on the calling thread.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the dispatcher was built without a repository.
    pub fn load<A: AggregateRoot>(&mut self, aggregate_root_id: &str) -> EventSourcingResult<Aggregate<A>> {
        let global = self.event.metadata.require_global_sequence_number()?;
        let uow = self.uow.as_deref_mut().ok_or_else(|| {
            EventSourcingError::illegal_state(format!(
                "view '{}' cannot load {} '{}': no aggregate repository configured",
                self.view_id,
                A::TYPE_NAME,
                aggregate_root_id
            ))
        })?;
        uow.load_as_of::<A>(aggregate_root_id, global)
    }
}

type ViewFn<V> =
    Box<dyn Fn(&mut V, &DomainEvent, &mut ViewContext<'_>) -> anyhow::Result<()> + Send + Sync>;

fn boxed<V, F>(handler: F) -> ViewFn<V>
where
    F: Fn(&mut V, &DomainEvent, &mut ViewContext<'_>) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
{
    Box::new(handler)
}

/// Subscription table of a view type
pub struct ViewHandlers<V> {
    handlers: HashMap<&'static str, ViewFn<V>>,
}

impl<V: 'static> ViewHandlers<V> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Subscribe to `E` with an infallible handler
    pub fn on<E, F>(self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut V, E) + Send + Sync + 'static,
    {
        self.try_on(move |view: &mut V, event: E, _ctx: &mut ViewContext<'_>| {
            handler(view, event);
            Ok(())
        })
    }

    /// Subscribe to `E` with a handler that may fail or load aggregates
    pub fn try_on<E, F>(mut self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut V, E, &mut ViewContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(
            E::EVENT_TYPE,
            boxed(move |view, event, ctx| {
                let typed = event.decode::<E>()?;
                handler(view, typed, ctx)
            }),
        );
        self
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Apply `event`; events without a subscription are ignored
    pub(crate) fn apply(
        &self,
        view: &mut V,
        event: &DomainEvent,
        ctx: &mut ViewContext<'_>,
    ) -> anyhow::Result<()> {
        let Some(handler) = self.handlers.get(event.event_type()) else {
            return Ok(());
        };
        handler(view, event, ctx).with_context(|| {
            format!(
                "{} at global sequence number {} failed in view instance '{}'",
                event.event_type(),
                event.global_sequence_number().unwrap_or(-1),
                ctx.view_id()
            )
        })
    }
}

impl<V: 'static> Default for ViewHandlers<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ViewHandlers<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&&'static str> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("ViewHandlers")
            .field("event_types", &types)
            .finish()
    }
}
