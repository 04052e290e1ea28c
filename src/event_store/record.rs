// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stored event row
//!
//! The persisted shape of one event, mirroring the reference relational
//! layout. Metadata and payload are serialized independently so a backend can
//! index the metadata columns without understanding the payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EventSourcingResult;
use crate::events::{keys, DomainEvent, Metadata};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Row id, assigned by the backend
    pub surrogate_id: u64,

    /// Batch the row was committed in
    pub batch_id: Uuid,

    /// Aggregate root id (unique together with `sequence_number`)
    pub aggregate_root_id: String,

    /// Per-aggregate sequence number
    pub sequence_number: i64,

    /// Store-wide sequence number (unique)
    pub global_sequence_number: i64,

    /// Event type tag
    pub event_type: String,

    /// Serialized metadata map
    pub meta: Vec<u8>,

    /// Serialized payload
    pub data: Vec<u8>,
}

impl EventRecord {
    /// Encode `event` as committed in `batch_id` at `global_sequence_number`
    ///
    /// The stored metadata includes the batch id and global sequence number
    /// even though `event` itself is not stamped until the commit succeeds.
    pub fn encode(
        surrogate_id: u64,
        batch_id: Uuid,
        global_sequence_number: i64,
        event: &DomainEvent,
    ) -> EventSourcingResult<Self> {
        let mut metadata = event.metadata.clone();
        metadata.insert(keys::BATCH_ID, batch_id);
        metadata.insert(keys::GLOBAL_SEQUENCE_NUMBER, global_sequence_number);

        Ok(Self {
            surrogate_id,
            batch_id,
            aggregate_root_id: metadata.require_aggregate_root_id()?.to_string(),
            sequence_number: metadata.require_sequence_number()?,
            global_sequence_number,
            event_type: event.event_type().to_string(),
            meta: serde_json::to_vec(&metadata)?,
            data: serde_json::to_vec(event.data())?,
        })
    }

    /// Decode the row back into a domain event
    pub fn decode(&self) -> EventSourcingResult<DomainEvent> {
        let metadata: Metadata = serde_json::from_slice(&self.meta)?;
        let data: serde_json::Value = serde_json::from_slice(&self.data)?;

        Ok(DomainEvent::new(self.event_type.clone(), data).with_metadata(metadata))
    }
}
