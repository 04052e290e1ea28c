// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Events
//!
//! A [`DomainEvent`] is an immutable payload tagged with its event type, plus a
//! mutable [`Metadata`] map. Typed events implement [`Event`] and are encoded
//! into the payload with `serde_json`; the store treats the payload as opaque.
//!
//! # Required metadata once committed
//!
//! ```text
//! aggregate_root_id   emitter identity
//! owner               emitter type name
//! seq                 per-aggregate sequence number, 0-based
//! global_seq          store-wide sequence number, 0-based
//! batch_id            atomic commit unit
//! time_utc/time_local emission timestamps
//! ```

pub mod metadata;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EventSourcingError, EventSourcingResult};

pub use metadata::{keys, Metadata, MetadataValue};

/// A typed domain event
///
/// `EVENT_TYPE` is the tag handlers are registered under. It must be stable
/// across releases since it is persisted with every event.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Event envelope as stored and dispatched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    event_type: String,
    data: serde_json::Value,
    /// Mutable metadata map
    pub metadata: Metadata,
}

impl DomainEvent {
    /// Create an envelope from an already encoded payload
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: Metadata::new(),
        }
    }

    /// Encode a typed event
    pub fn from_event<E: Event>(event: &E) -> EventSourcingResult<Self> {
        Ok(Self::new(E::EVENT_TYPE, serde_json::to_value(event)?))
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Decode the payload as `E`, checking the type tag first
    pub fn decode<E: Event>(&self) -> EventSourcingResult<E> {
        if self.event_type != E::EVENT_TYPE {
            return Err(EventSourcingError::illegal_state(format!(
                "cannot decode {} event as {}",
                self.event_type,
                E::EVENT_TYPE
            )));
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn aggregate_root_id(&self) -> Option<&str> {
        self.metadata.aggregate_root_id()
    }

    pub fn sequence_number(&self) -> Option<i64> {
        self.metadata.sequence_number()
    }

    pub fn global_sequence_number(&self) -> Option<i64> {
        self.metadata.global_sequence_number()
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        self.metadata.batch_id()
    }
}
