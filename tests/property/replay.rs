// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Aggregate Replay
//!
//! Random deposit/withdraw commands are run through units of work and
//! compared against a plain running sum.

use std::sync::Arc;

use cim_event_store::aggregate::UnitOfWork;
use cim_event_store::event_store::EventStore;
use proptest::prelude::*;

use crate::fixtures::*;

#[derive(Debug, Clone)]
enum Op {
    Deposit(i64),
    Withdraw(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..500).prop_map(Op::Deposit),
        (1i64..500).prop_map(Op::Withdraw),
    ]
}

/// Commands, each a list of operations committed in one unit of work
fn commands() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op(), 1..4), 0..12)
}

fn delta(op: &Op) -> i64 {
    match op {
        Op::Deposit(amount) => *amount,
        Op::Withdraw(amount) => -amount,
    }
}

proptest! {
    /// Property: hydrated state equals the fold of everything emitted
    #[test]
    fn prop_replay_matches_running_sum(commands in commands()) {
        let (_store, repository) = in_memory();
        open_account(&repository, ACCOUNT_1, "alice").unwrap();

        for command in &commands {
            let mut uow = UnitOfWork::new(Arc::clone(&repository));
            let account = uow.get::<Account>(ACCOUNT_1, false).unwrap();
            for op in command {
                let emitted = match op {
                    Op::Deposit(amount) => account.emit(&mut uow, Deposited { amount: *amount }),
                    Op::Withdraw(amount) => account.emit(&mut uow, Withdrawn { amount: *amount }),
                };
                emitted.unwrap();
            }
            uow.commit().unwrap();
        }

        let expected: i64 = commands.iter().flatten().map(delta).sum();
        let first = account_state(&repository, ACCOUNT_1).unwrap();
        let second = account_state(&repository, ACCOUNT_1).unwrap();

        prop_assert_eq!(first.balance, expected);
        prop_assert_eq!(first, second);
    }

    /// Property: a load as of global G sees exactly the events at or before G
    #[test]
    fn prop_historical_loads_see_prefixes(ops in prop::collection::vec(op(), 1..20)) {
        let (store, repository) = in_memory();
        open_account(&repository, ACCOUNT_1, "alice").unwrap();
        for op in &ops {
            let committed = match op {
                Op::Deposit(amount) => deposit(&repository, ACCOUNT_1, *amount),
                Op::Withdraw(amount) => withdraw(&repository, ACCOUNT_1, *amount),
            };
            committed.unwrap();
        }

        let head = store.next_global_sequence_number().unwrap();
        let mut uow = UnitOfWork::new(Arc::clone(&repository));
        let mut running = 0;
        for global in 1..head {
            running += delta(&ops[(global - 1) as usize]);
            let historical = uow.load_as_of::<Account>(ACCOUNT_1, global).unwrap();
            prop_assert_eq!(historical.state().balance, running);
            prop_assert_eq!(historical.last_sequence_number(), global);
        }
    }
}
