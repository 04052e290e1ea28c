// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Metadata
//!
//! Metadata is a mutable map of string keys to primitive values that travels
//! next to the immutable payload. The emitting aggregate stamps identity,
//! ownership, sequence number and timestamps; the event store stamps the batch
//! id and the global sequence number when the batch commits.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EventSourcingError, EventSourcingResult};

/// Well-known metadata keys
pub mod keys {
    /// Id of the aggregate root that emitted the event
    pub const AGGREGATE_ROOT_ID: &str = "aggregate_root_id";
    /// Type name of the emitting aggregate root
    pub const OWNER: &str = "owner";
    /// Per-aggregate sequence number (0-based)
    pub const SEQUENCE_NUMBER: &str = "seq";
    /// Store-wide sequence number (0-based), stamped on commit
    pub const GLOBAL_SEQUENCE_NUMBER: &str = "global_seq";
    /// Id of the batch the event was committed in
    pub const BATCH_ID: &str = "batch_id";
    /// Emission time in UTC (RFC 3339)
    pub const TIME_UTC: &str = "time_utc";
    /// Emission time in the emitter's local offset (RFC 3339)
    pub const TIME_LOCAL: &str = "time_local";
}

/// A primitive metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(value) => write!(f, "{}", value),
            MetadataValue::Int(value) => write!(f, "{}", value),
            MetadataValue::Float(value) => write!(f, "{}", value),
            MetadataValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<Uuid> for MetadataValue {
    fn from(value: Uuid) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Text(value.to_rfc3339())
    }
}

/// Metadata map attached to every domain event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn aggregate_root_id(&self) -> Option<&str> {
        self.get(keys::AGGREGATE_ROOT_ID).and_then(MetadataValue::as_str)
    }

    pub fn owner(&self) -> Option<&str> {
        self.get(keys::OWNER).and_then(MetadataValue::as_str)
    }

    pub fn sequence_number(&self) -> Option<i64> {
        self.get(keys::SEQUENCE_NUMBER).and_then(MetadataValue::as_i64)
    }

    pub fn global_sequence_number(&self) -> Option<i64> {
        self.get(keys::GLOBAL_SEQUENCE_NUMBER)
            .and_then(MetadataValue::as_i64)
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        self.get(keys::BATCH_ID)
            .and_then(MetadataValue::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        self.get(keys::TIME_UTC)
            .and_then(MetadataValue::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|time| time.with_timezone(&Utc))
    }

    /// Stamp both emission timestamps from a single instant
    pub fn stamp_time(&mut self, now: DateTime<Utc>) {
        self.insert(keys::TIME_UTC, now);
        self.insert(
            keys::TIME_LOCAL,
            now.with_timezone(&Local).to_rfc3339(),
        );
    }

    pub fn require_aggregate_root_id(&self) -> EventSourcingResult<&str> {
        self.aggregate_root_id()
            .ok_or_else(|| missing(keys::AGGREGATE_ROOT_ID))
    }

    pub fn require_sequence_number(&self) -> EventSourcingResult<i64> {
        self.sequence_number()
            .ok_or_else(|| missing(keys::SEQUENCE_NUMBER))
    }

    pub fn require_global_sequence_number(&self) -> EventSourcingResult<i64> {
        self.global_sequence_number()
            .ok_or_else(|| missing(keys::GLOBAL_SEQUENCE_NUMBER))
    }
}

fn missing(key: &str) -> EventSourcingError {
    EventSourcingError::illegal_state(format!("event metadata is missing '{}'", key))
}
