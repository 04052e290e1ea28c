// Copyright (c) 2025 - Cowboy AI, Inc.
//! Typed apply handlers
//!
//! An [`EventHandlers`] table maps event-type tags to closures over the
//! aggregate's state. It is resolved once per aggregate type and consulted by
//! tag on every apply; there is no per-call type inspection.

use std::collections::HashMap;
use std::fmt;

use crate::aggregate::ApplyContext;
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::events::{DomainEvent, Event};

type ApplyFn<A> = Box<
    dyn Fn(&mut A, &DomainEvent, &mut ApplyContext<'_>) -> anyhow::Result<()> + Send + Sync,
>;

fn boxed<A, F>(handler: F) -> ApplyFn<A>
where
    F: Fn(&mut A, &DomainEvent, &mut ApplyContext<'_>) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
{
    Box::new(handler)
}

/// Handler table for one aggregate type
pub struct EventHandlers<A> {
    handlers: HashMap<&'static str, ApplyFn<A>>,
}

impl<A: 'static> EventHandlers<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an infallible handler for `E`
    pub fn on<E, F>(self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut A, E) + Send + Sync + 'static,
    {
        self.try_on(move |root: &mut A, event: E, _ctx: &mut ApplyContext<'_>| {
            handler(root, event);
            Ok(())
        })
    }

    /// Register a handler for `E` that may fail or load other aggregates
    pub fn try_on<E, F>(mut self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut A, E, &mut ApplyContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(
            E::EVENT_TYPE,
            boxed(move |root, event, ctx| {
                let typed = event.decode::<E>()?;
                handler(root, typed, ctx)
            }),
        );
        self
    }

    /// Whether `event_type` is in this aggregate's capability set
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Dispatch `event` to its handler
    ///
    /// A missing handler is an `IllegalState`; a failing handler is wrapped
    /// into an `Application` error naming the event and the aggregate.
    pub(crate) fn apply(
        &self,
        root: &mut A,
        event: &DomainEvent,
        ctx: &mut ApplyContext<'_>,
    ) -> EventSourcingResult<()> {
        let handler = self.handlers.get(event.event_type()).ok_or_else(|| {
            EventSourcingError::illegal_state(format!(
                "aggregate root '{}' has no handler for {}",
                ctx.aggregate_root_id(),
                event.event_type()
            ))
        })?;

        handler(root, event, ctx).map_err(|source| EventSourcingError::Application {
            event_type: event.event_type().to_string(),
            aggregate_root_id: ctx.aggregate_root_id().to_string(),
            source,
        })
    }
}

impl<A: 'static> Default for EventHandlers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventHandlers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&&'static str> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("EventHandlers")
            .field("event_types", &types)
            .finish()
    }
}
