// Copyright (c) 2025 - Cowboy AI, Inc.
//! View locators map an event to the view instance ids it updates

use crate::errors::EventSourcingResult;
use crate::events::DomainEvent;

/// Id of the single instance used by [`GlobalInstanceLocator`]
pub const GLOBAL_VIEW_ID: &str = "__global__";

pub trait ViewLocator: Send + Sync + 'static {
    fn view_ids(event: &DomainEvent) -> EventSourcingResult<Vec<String>>;
}

/// One view instance per aggregate root, keyed by the root's id
#[derive(Debug, Clone, Copy, Default)]
pub struct InstancePerAggregateRootLocator;

impl ViewLocator for InstancePerAggregateRootLocator {
    fn view_ids(event: &DomainEvent) -> EventSourcingResult<Vec<String>> {
        Ok(vec![event.metadata.require_aggregate_root_id()?.to_string()])
    }
}

/// A single view instance receiving every subscribed event
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalInstanceLocator;

impl ViewLocator for GlobalInstanceLocator {
    fn view_ids(_event: &DomainEvent) -> EventSourcingResult<Vec<String>> {
        Ok(vec![GLOBAL_VIEW_ID.to_string()])
    }
}
