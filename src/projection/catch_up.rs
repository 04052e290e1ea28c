// Copyright (c) 2025 - Cowboy AI, Inc.
//! Catch-up dispatcher
//!
//! Pulls the global stream from the store and feeds it to the managed views.
//! A pass reads at most `max_events_per_pass` events starting after the
//! lowest view watermark, groups them by commit batch and dispatches every
//! group to every view that has not seen it yet.
//!
//! # Loop
//!
//! ```text
//! ┌──────────────┐  events   ┌──────────────┐
//! │ catch_up_once│ ────────> │ next pass    │
//! └──────┬───────┘           └──────────────┘
//!        │ nothing new / failure
//!        ▼
//!   wait for notify() | poll interval | shutdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::aggregate::AggregateRootRepository;
use crate::command::CommandResult;
use crate::config::DispatcherConfig;
use crate::errors::{EventSourcingError, EventSourcingResult};
use crate::event_store::EventStore;
use crate::events::DomainEvent;
use crate::projection::{DispatchContext, ManagedView};

pub struct CatchUpDispatcher {
    store: Arc<dyn EventStore>,
    views: Vec<Arc<dyn ManagedView>>,
    context: DispatchContext,
    config: DispatcherConfig,
    wakeup: Arc<Notify>,
}

impl CatchUpDispatcher {
    pub fn new(store: Arc<dyn EventStore>, config: DispatcherConfig) -> Self {
        Self {
            store,
            views: Vec::new(),
            context: DispatchContext::new(),
            config,
            wakeup: Arc::new(Notify::new()),
        }
    }

    /// Let view handlers load aggregates through `repository`
    pub fn with_repository(mut self, repository: Arc<AggregateRootRepository>) -> Self {
        self.context = DispatchContext::with_repository(repository);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn ManagedView>) -> Self {
        self.views.push(view);
        self
    }

    pub fn add_view(&mut self, view: Arc<dyn ManagedView>) {
        self.views.push(view);
    }

    pub fn views(&self) -> &[Arc<dyn ManagedView>] {
        &self.views
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Wake the background loop, if running, without waiting for the poll interval
    pub fn notify(&self) {
        self.wakeup.notify_one();
    }

    /// Run one pass and return how many events were dispatched
    ///
    /// Every view gets its groups even when another view fails; the first
    /// failure is returned after all views were tried.
    pub async fn catch_up_once(&self) -> EventSourcingResult<usize> {
        let mut watermarks = Vec::with_capacity(self.views.len());
        for view in &self.views {
            watermarks.push(view.low_watermark(true).await?);
        }
        let Some(lowest) = watermarks.iter().copied().min() else {
            return Ok(0);
        };

        let limit = self.config.max_events_per_pass;
        let events = self.read_from(lowest + 1, limit).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let truncated = events.len() >= limit;
        let mut groups = group_batches(events, self.config.max_group_size);
        if truncated && groups.len() > 1 {
            // The last batch may continue past the page
            groups.pop();
        }
        let dispatched: usize = groups.iter().map(Vec::len).sum();

        let mut first_failure: Option<EventSourcingError> = None;
        for (view, watermark) in self.views.iter().zip(watermarks) {
            for group in &groups {
                let group_max = group
                    .last()
                    .and_then(DomainEvent::global_sequence_number)
                    .unwrap_or(-1);
                if group_max <= watermark {
                    continue;
                }

                if let Err(err) = view.dispatch(&self.context, group).await {
                    error!(
                        view = view.name(),
                        watermark,
                        error = %err,
                        "View dispatch failed, will retry on the next pass"
                    );
                    first_failure.get_or_insert(err);
                    break;
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => {
                debug!(
                    from = lowest + 1,
                    events = dispatched,
                    groups = groups.len(),
                    "Catch-up pass complete"
                );
                Ok(dispatched)
            }
        }
    }

    /// Wait until every view has processed `result`
    pub async fn wait_until_dispatched(
        &self,
        result: &CommandResult,
        timeout: Duration,
    ) -> EventSourcingResult<()> {
        try_join_all(
            self.views
                .iter()
                .map(|view| view.wait_until_dispatched(result, timeout)),
        )
        .await?;
        Ok(())
    }

    /// Spawn the catch-up loop on the current runtime
    pub fn start(self) -> CatchUpHandle {
        let dispatcher = Arc::new(self);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = Arc::clone(&dispatcher);
        let task = tokio::spawn(async move { worker.run(shutdown_rx).await });

        CatchUpHandle {
            dispatcher,
            shutdown,
            task,
        }
    }

    async fn read_from(&self, from: i64, limit: usize) -> EventSourcingResult<Vec<DomainEvent>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            store
                .stream(from)
                .take(limit)
                .collect::<EventSourcingResult<Vec<_>>>()
        })
        .await
        .map_err(|e| EventSourcingError::Storage(format!("event stream task failed: {}", e)))?
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(views = self.views.len(), "Catch-up dispatcher started");

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            let idle = match self.catch_up_once().await {
                Ok(0) => true,
                Ok(_) => false,
                Err(err) => {
                    error!(error = %err, "Catch-up pass failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = self.wakeup.notified() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        // Handle dropped
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Catch-up dispatcher stopped");
    }
}

impl std::fmt::Debug for CatchUpDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.views.iter().map(|view| view.name()).collect();
        f.debug_struct("CatchUpDispatcher")
            .field("views", &names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Running catch-up loop
///
/// Dropping the handle stops the loop at its next idle point.
pub struct CatchUpHandle {
    dispatcher: Arc<CatchUpDispatcher>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CatchUpHandle {
    pub fn dispatcher(&self) -> &Arc<CatchUpDispatcher> {
        &self.dispatcher
    }

    /// Signal that new events were committed
    pub fn notify(&self) {
        self.dispatcher.notify();
    }

    /// Wait using the configured default timeout
    pub async fn wait_until_dispatched(&self, result: &CommandResult) -> EventSourcingResult<()> {
        self.dispatcher
            .wait_until_dispatched(result, self.dispatcher.config.default_wait_timeout)
            .await
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) -> EventSourcingResult<()> {
        self.shutdown.send_replace(true);
        self.task
            .await
            .map_err(|e| EventSourcingError::IllegalState(format!("catch-up loop panicked: {}", e)))
    }
}

/// Split a page of events into dispatch groups
///
/// Consecutive events sharing a batch id form one group. Events without a
/// batch id are chunked by `max_group_size`.
pub fn group_batches(events: Vec<DomainEvent>, max_group_size: usize) -> Vec<Vec<DomainEvent>> {
    let max_group_size = max_group_size.max(1);
    let mut groups: Vec<Vec<DomainEvent>> = Vec::new();

    for event in events {
        let starts_group = match groups.last() {
            None => true,
            Some(current) => {
                let previous = current.last().and_then(DomainEvent::batch_id);
                match (previous, event.batch_id()) {
                    (Some(previous), Some(next)) => previous != next,
                    (None, None) => current.len() >= max_group_size,
                    _ => true,
                }
            }
        };

        match groups.last_mut() {
            Some(current) if !starts_group => current.push(event),
            _ => groups.push(vec![event]),
        }
    }

    groups
}
