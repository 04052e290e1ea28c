// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sequence Number Allocation
//!
//! Every aggregate root carries an allocator for its per-aggregate sequence
//! numbers. Normally hydrated aggregates get a [`SequenceAllocator::Live`]
//! continuing after the last replayed number; aggregates hydrated as nested
//! loads during emit or replay get [`SequenceAllocator::Frozen`], which refuses
//! to allocate so a historical view can never originate new events.

use crate::aggregate::ReplayState;
use crate::errors::{EventSourcingError, EventSourcingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAllocator {
    /// Hands out `next`, `next + 1`, ...
    Live { next: i64 },
    /// Every allocation fails
    Frozen,
}

impl SequenceAllocator {
    /// Allocator continuing after `last_sequence_number` (-1 for a new aggregate)
    pub fn live(last_sequence_number: i64) -> Self {
        SequenceAllocator::Live {
            next: last_sequence_number + 1,
        }
    }

    pub fn frozen() -> Self {
        SequenceAllocator::Frozen
    }

    /// Pick the variant for an aggregate hydrated while in `replay_state`
    pub fn for_replay_state(replay_state: ReplayState, last_sequence_number: i64) -> Self {
        match replay_state {
            ReplayState::None => Self::live(last_sequence_number),
            ReplayState::EmitApply | ReplayState::ReplayApply => Self::frozen(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, SequenceAllocator::Frozen)
    }

    /// Allocate the next sequence number for `aggregate_root_id`
    pub fn next(&mut self, aggregate_root_id: &str) -> EventSourcingResult<i64> {
        match self {
            SequenceAllocator::Live { next } => {
                let allocated = *next;
                *next += 1;
                Ok(allocated)
            }
            SequenceAllocator::Frozen => Err(EventSourcingError::illegal_state(format!(
                "aggregate root '{}' was loaded at a historical cutoff and cannot emit events",
                aggregate_root_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_live_allocator_is_strictly_increasing() {
        let mut allocator = SequenceAllocator::live(-1);

        let allocated: Vec<i64> = (0..4).map(|_| allocator.next("acc-1").unwrap()).collect();

        assert_eq!(allocated, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_live_allocator_continues_after_last() {
        let mut allocator = SequenceAllocator::live(6);
        assert_eq!(allocator.next("acc-1").unwrap(), 7);
    }

    #[test]
    fn test_frozen_allocator_always_fails() {
        let mut allocator = SequenceAllocator::frozen();

        for _ in 0..2 {
            let result = allocator.next("acc-1");
            assert!(matches!(result, Err(EventSourcingError::IllegalState(_))));
        }
    }

    #[test_case(ReplayState::None, false ; "live when idle")]
    #[test_case(ReplayState::EmitApply, true ; "frozen during emit")]
    #[test_case(ReplayState::ReplayApply, true ; "frozen during replay")]
    fn test_variant_follows_replay_state(state: ReplayState, frozen: bool) {
        assert_eq!(SequenceAllocator::for_replay_state(state, 2).is_frozen(), frozen);
    }
}
