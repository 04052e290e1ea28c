// Copyright (c) 2025 - Cowboy AI, Inc.
//! Command results
//!
//! A command returns as soon as its batch is committed. Views catch up
//! asynchronously; a caller that needs to read its own writes passes the
//! result to `wait_until_dispatched`, which uses the highest global sequence
//! number as the wait threshold.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    batch_id: Option<Uuid>,
    global_sequence_numbers: Vec<i64>,
}

impl CommandResult {
    /// Result of a command that emitted nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(batch_id: Uuid, global_sequence_numbers: Vec<i64>) -> Self {
        Self {
            batch_id: Some(batch_id),
            global_sequence_numbers,
        }
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        self.batch_id
    }

    pub fn events_emitted(&self) -> bool {
        !self.global_sequence_numbers.is_empty()
    }

    pub fn global_sequence_numbers(&self) -> &[i64] {
        &self.global_sequence_numbers
    }

    /// The wait threshold for read-your-writes
    pub fn highest_global_sequence_number(&self) -> Option<i64> {
        self.global_sequence_numbers.iter().copied().max()
    }
}
