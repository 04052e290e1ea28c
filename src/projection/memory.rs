// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory view manager
//!
//! Keeps every instance of one view type in a map. A group is applied to
//! copies of the affected instances and swapped in only when every event in
//! it succeeded, so a failing handler leaves both the instances and the
//! watermark untouched.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregate::UnitOfWork;
use crate::command::CommandResult;
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::events::DomainEvent;
use crate::projection::{
    run_blocking, wait_for_watermark, DispatchContext, ManagedView, ViewContext, ViewHandlers,
    ViewInstance, ViewLocator,
};

#[derive(Debug, Clone)]
struct Slot<V> {
    view: V,
    last_global_sequence_number: i64,
}

pub struct InMemoryViewManager<V: ViewInstance> {
    name: String,
    handlers: ViewHandlers<V>,
    instances: RwLock<HashMap<String, Slot<V>>>,
    watermark: watch::Sender<i64>,
}

impl<V: ViewInstance> InMemoryViewManager<V> {
    pub fn new(name: impl Into<String>) -> Self {
        let (watermark, _) = watch::channel(-1);
        Self {
            name: name.into(),
            handlers: V::handlers(),
            instances: RwLock::new(HashMap::new()),
            watermark,
        }
    }

    /// Convenience for handing the manager to a dispatcher and keeping a reference
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Snapshot of one instance
    pub fn load(&self, view_id: &str) -> Option<V> {
        self.instances.read().get(view_id).map(|slot| slot.view.clone())
    }

    pub fn view_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Highest global sequence number applied to `view_id`, -1 if none
    pub fn instance_watermark(&self, view_id: &str) -> i64 {
        self.instances
            .read()
            .get(view_id)
            .map_or(-1, |slot| slot.last_global_sequence_number)
    }

    pub fn current_watermark(&self) -> i64 {
        *self.watermark.borrow()
    }

    /// Apply `batch` to copies of the instances it touches
    fn stage(
        &self,
        ctx: &DispatchContext,
        batch: &[DomainEvent],
        watermark: i64,
    ) -> EventSourcingResult<HashMap<String, Slot<V>>> {
        let mut staged: HashMap<String, Slot<V>> = HashMap::new();
        let mut uow = ctx
            .repository()
            .map(|repository| UnitOfWork::new(Arc::clone(repository)));

        for event in batch {
            let global = event.metadata.require_global_sequence_number()?;
            if global <= watermark || !self.handlers.subscribes_to(event.event_type()) {
                continue;
            }

            for view_id in V::Locator::view_ids(event)? {
                let slot = match staged.entry(view_id.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let existing = self.instances.read().get(&view_id).cloned();
                        entry.insert(existing.unwrap_or_else(|| Slot {
                            view: V::create(&view_id),
                            last_global_sequence_number: -1,
                        }))
                    }
                };

                if global <= slot.last_global_sequence_number {
                    continue;
                }

                let mut view_ctx = ViewContext::new(&view_id, event, uow.as_mut());
                self.handlers
                    .apply(&mut slot.view, event, &mut view_ctx)
                    .map_err(|source| EventSourcingError::ViewDispatch {
                        view: self.name.clone(),
                        source,
                    })?;
                slot.last_global_sequence_number = global;
            }
        }

        Ok(staged)
    }
}

#[async_trait]
impl<V: ViewInstance> ManagedView for InMemoryViewManager<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn low_watermark(&self, _can_use_cache: bool) -> EventSourcingResult<i64> {
        Ok(self.current_watermark())
    }

    async fn dispatch(
        &self,
        ctx: &DispatchContext,
        batch: &[DomainEvent],
    ) -> EventSourcingResult<()> {
        let Some(batch_max) = batch
            .iter()
            .filter_map(DomainEvent::global_sequence_number)
            .max()
        else {
            return Ok(());
        };

        let watermark = self.current_watermark();
        if batch_max <= watermark {
            return Ok(());
        }

        // Handlers that load aggregates read the store synchronously
        let staged = match ctx.repository() {
            Some(_) => run_blocking(|| self.stage(ctx, batch, watermark)),
            None => self.stage(ctx, batch, watermark),
        }?;
        let touched = staged.len();
        self.instances.write().extend(staged);
        self.watermark.send_replace(batch_max);

        debug!(
            view = %self.name,
            events = batch.len(),
            instances = touched,
            watermark = batch_max,
            "Dispatched batch to view"
        );
        Ok(())
    }

    async fn wait_until_dispatched(
        &self,
        result: &CommandResult,
        timeout: Duration,
    ) -> EventSourcingResult<()> {
        let Some(threshold) = result.highest_global_sequence_number() else {
            return Ok(());
        };

        wait_for_watermark(self.watermark.subscribe(), threshold, timeout)
            .await
            .map_err(|watermark| {
                warn!(
                    view = %self.name,
                    threshold,
                    watermark,
                    "Timed out waiting for view to catch up"
                );
                EventSourcingError::Timeout {
                    view: self.name.clone(),
                    threshold,
                    watermark,
                }
            })
    }

    async fn purge(&self) -> EventSourcingResult<()> {
        let purged = {
            let mut instances = self.instances.write();
            let count = instances.len();
            instances.clear();
            count
        };
        self.watermark.send_replace(-1);
        info!(view = %self.name, instances = purged, "Purged view");
        Ok(())
    }
}

impl<V: ViewInstance> std::fmt::Debug for InMemoryViewManager<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryViewManager")
            .field("name", &self.name)
            .field("instances", &self.instances.read().len())
            .field("watermark", &self.current_watermark())
            .finish()
    }
}
