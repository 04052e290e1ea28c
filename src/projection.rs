// Copyright (c) 2025 - Cowboy AI, Inc.

//! Catch-up views
//!
//! Views are read models built from the global event stream. Each managed
//! view owns a **low watermark**: the highest global sequence number it has
//! fully processed. A [`CatchUpDispatcher`] streams events from the store
//! starting at the smallest watermark and hands them to every view in
//! commit-batch groups.
//!
//! # Architecture
//!
//! ```text
//!  EventStore ──stream(min + 1)──> CatchUpDispatcher
//!                                     │ group by batch id
//!                                     ▼
//!                       ┌─────────────┼─────────────┐
//!                       ▼             ▼             ▼
//!                   ManagedView   ManagedView   ManagedView
//!                   (watermark)   (watermark)   (watermark)
//!                       │
//!                       ▼
//!        wait_until_dispatched(result) resolves once watermark >= result
//! ```
//!
//! # Guarantees
//!
//! - A view never advances past an event it failed to process; the failing
//!   group is retried on the next pass.
//! - Re-delivering events at or below a watermark is a no-op.
//! - Waiting for a [`CommandResult`](crate::command::CommandResult) gives
//!   read-your-writes against every managed view.

pub mod catch_up;
pub mod locator;
pub mod memory;
pub mod view;

pub use catch_up::{CatchUpDispatcher, CatchUpHandle};
pub use locator::{GlobalInstanceLocator, InstancePerAggregateRootLocator, ViewLocator};
pub use memory::InMemoryViewManager;
pub use view::{ViewContext, ViewHandlers, ViewInstance};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;

use crate::aggregate::AggregateRootRepository;
use crate::command::CommandResult;
use crate::errors::EventSourcingResult;
use crate::events::DomainEvent;

/// A view kept up to date by the catch-up dispatcher
#[async_trait]
pub trait ManagedView: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Highest global sequence number fully processed, -1 if none
    ///
    /// Backends that persist their watermark may answer from memory when
    /// `can_use_cache` is set.
    async fn low_watermark(&self, can_use_cache: bool) -> EventSourcingResult<i64>;

    /// Process one group of events in global order
    ///
    /// Either the whole group is applied and the watermark moves to its
    /// highest global sequence number, or nothing changes and an error is
    /// returned.
    async fn dispatch(&self, ctx: &DispatchContext, batch: &[DomainEvent])
        -> EventSourcingResult<()>;

    /// Resolve once the watermark reaches the result's highest position
    ///
    /// Fails with `Timeout` if that does not happen within `timeout`.
    async fn wait_until_dispatched(
        &self,
        result: &CommandResult,
        timeout: Duration,
    ) -> EventSourcingResult<()>;

    /// Drop every instance and reset the watermark to -1
    async fn purge(&self) -> EventSourcingResult<()>;
}

/// What the dispatcher hands to views alongside each group
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    repository: Option<Arc<AggregateRootRepository>>,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow view handlers to load aggregates
    pub fn with_repository(repository: Arc<AggregateRootRepository>) -> Self {
        Self {
            repository: Some(repository),
        }
    }

    pub fn repository(&self) -> Option<&Arc<AggregateRootRepository>> {
        self.repository.as_ref()
    }
}

/// Run synchronous store work from async code
///
/// On a multi-threaded runtime the worker hands its other tasks off before
/// blocking. A current-thread runtime has nowhere to move them, so the work
/// runs inline there.
pub(crate) fn run_blocking<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

/// Wait on a watermark channel until it reaches `threshold`
///
/// Returns the last observed watermark as the error when `timeout` elapses
/// or the sender is gone.
pub(crate) async fn wait_for_watermark(
    mut receiver: watch::Receiver<i64>,
    threshold: i64,
    timeout: Duration,
) -> Result<(), i64> {
    let reached = tokio::time::timeout(timeout, async {
        loop {
            let watermark = *receiver.borrow_and_update();
            if watermark >= threshold {
                return true;
            }
            if receiver.changed().await.is_err() {
                return false;
            }
        }
    })
    .await;

    let last_seen = *receiver.borrow();
    match reached {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(last_seen),
    }
}
