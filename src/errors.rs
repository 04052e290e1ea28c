// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for event store, aggregate and view operations

use thiserror::Error;
use uuid::Uuid;

use crate::events::DomainEvent;

/// Errors that can occur while saving, hydrating or dispatching events
#[derive(Debug, Error)]
pub enum EventSourcingError {
    /// Optimistic concurrency conflict: the whole batch was rejected
    ///
    /// Carries the batch id the caller submitted and the submitted events that
    /// collided with already committed ones. The caller owns the retry.
    #[error("Concurrency conflict in batch {batch_id}: {} event(s) collided with committed events", conflicting.len())]
    Concurrency {
        batch_id: Uuid,
        conflicting: Vec<DomainEvent>,
    },

    /// No events exist for the requested aggregate
    #[error("Aggregate root {aggregate_type} with id '{aggregate_root_id}' not found")]
    NotFound {
        aggregate_type: String,
        aggregate_root_id: String,
    },

    /// Invalid use of the emit/replay protocol
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A view did not reach the requested watermark in time
    #[error("Timed out waiting for view '{view}' to reach {threshold} (watermark {watermark})")]
    Timeout {
        view: String,
        threshold: i64,
        watermark: i64,
    },

    /// Any other persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payload or metadata codec failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A domain event handler failed while applying an event
    #[error("Applying {event_type} to aggregate root '{aggregate_root_id}' failed: {source}")]
    Application {
        event_type: String,
        aggregate_root_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A view handler failed; the batch stays unapplied
    #[error("View '{view}' failed to dispatch batch: {source}")]
    ViewDispatch {
        view: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EventSourcingError {
    /// Whether this is the distinguished optimistic-concurrency case
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventSourcingError::Concurrency { .. })
    }

    /// Whether a wait-until-visible deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, EventSourcingError::Timeout { .. })
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        EventSourcingError::IllegalState(message.into())
    }
}

/// Result type for event sourcing operations
pub type EventSourcingResult<T> = Result<T, EventSourcingError>;

impl From<serde_json::Error> for EventSourcingError {
    fn from(err: serde_json::Error) -> Self {
        EventSourcingError::Serialization(err.to_string())
    }
}
