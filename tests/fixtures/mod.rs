// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-event-store
//!
//! A small banking domain used across the integration tests:
//!
//! - `Account`: opened, credited, debited, flagged
//! - `Ledger`: records account balances by loading the account while applying
//! - `BalanceView`: one instance per account
//! - `DepositsByOwner`: a global view that loads accounts from its handler
//! - `StrictView`: refuses flagged accounts, for dispatch failure tests
//!
//! Fixtures are the only place that defines domain events and aggregates;
//! tests drive them through the helper functions below.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cim_event_store::aggregate::{
    AggregateRoot, AggregateRootRepository, ApplyContext, EventHandlers, UnitOfWork,
};
use cim_event_store::event_store::InMemoryEventStore;
use cim_event_store::events::Event;
use cim_event_store::projection::{
    GlobalInstanceLocator, InstancePerAggregateRootLocator, ViewContext, ViewHandlers,
    ViewInstance,
};
use cim_event_store::{CommandResult, EventSourcingResult};

pub const ACCOUNT_1: &str = "account-0001";
pub const ACCOUNT_2: &str = "account-0002";
pub const LEDGER_1: &str = "ledger-0001";

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner: String,
}

impl Event for AccountOpened {
    const EVENT_TYPE: &'static str = "AccountOpened";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposited {
    pub amount: i64,
}

impl Event for Deposited {
    const EVENT_TYPE: &'static str = "Deposited";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub amount: i64,
}

impl Event for Withdrawn {
    const EVENT_TYPE: &'static str = "Withdrawn";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flagged {
    pub reason: String,
}

impl Event for Flagged {
    const EVENT_TYPE: &'static str = "Flagged";
}

/// Handled by `Account`, but its handler always fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corrupted;

impl Event for Corrupted {
    const EVENT_TYPE: &'static str = "Corrupted";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecorded {
    pub account_id: String,
}

impl Event for BalanceRecorded {
    const EVENT_TYPE: &'static str = "BalanceRecorded";
}

/// Not handled by any aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unknown;

impl Event for Unknown {
    const EVENT_TYPE: &'static str = "Unknown";
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
    pub flagged: bool,
}

impl AggregateRoot for Account {
    const TYPE_NAME: &'static str = "Account";

    fn create(_aggregate_root_id: &str) -> Self {
        Self::default()
    }

    fn handlers() -> EventHandlers<Self> {
        EventHandlers::new()
            .on(|account: &mut Account, event: AccountOpened| account.owner = event.owner)
            .on(|account: &mut Account, event: Deposited| account.balance += event.amount)
            .on(|account: &mut Account, event: Withdrawn| account.balance -= event.amount)
            .on(|account: &mut Account, _event: Flagged| account.flagged = true)
            .try_on(
                |_account: &mut Account, _event: Corrupted, _ctx: &mut ApplyContext<'_>| {
                    anyhow::bail!("account state is corrupted")
                },
            )
    }
}

/// Records `(account id, balance seen)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub entries: Vec<(String, i64)>,
}

impl AggregateRoot for Ledger {
    const TYPE_NAME: &'static str = "Ledger";

    fn create(_aggregate_root_id: &str) -> Self {
        Self::default()
    }

    fn handlers() -> EventHandlers<Self> {
        EventHandlers::new().try_on(
            |ledger: &mut Ledger, event: BalanceRecorded, ctx: &mut ApplyContext<'_>| {
                let account = ctx.load::<Account>(&event.account_id, false)?;
                let balance = account.state().balance;
                ledger.entries.push((event.account_id, balance));
                Ok(())
            },
        )
    }
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceView {
    pub owner: String,
    pub balance: i64,
    pub events: usize,
}

impl ViewInstance for BalanceView {
    type Locator = InstancePerAggregateRootLocator;

    fn create(_view_id: &str) -> Self {
        Self::default()
    }

    fn handlers() -> ViewHandlers<Self> {
        ViewHandlers::new()
            .on(|view: &mut BalanceView, event: AccountOpened| {
                view.owner = event.owner;
                view.events += 1;
            })
            .on(|view: &mut BalanceView, event: Deposited| {
                view.balance += event.amount;
                view.events += 1;
            })
            .on(|view: &mut BalanceView, event: Withdrawn| {
                view.balance -= event.amount;
                view.events += 1;
            })
    }
}

/// Total deposits per owner; looks the owner up on the account
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositsByOwner {
    pub totals: BTreeMap<String, i64>,
}

impl ViewInstance for DepositsByOwner {
    type Locator = GlobalInstanceLocator;

    fn create(_view_id: &str) -> Self {
        Self::default()
    }

    fn handlers() -> ViewHandlers<Self> {
        ViewHandlers::new().try_on(
            |view: &mut DepositsByOwner, event: Deposited, ctx: &mut ViewContext<'_>| {
                let account_id = ctx
                    .aggregate_root_id()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("deposit without aggregate root id"))?;
                let account = ctx.load::<Account>(&account_id)?;
                let owner = account.state().owner.clone();
                *view.totals.entry(owner).or_insert(0) += event.amount;
                Ok(())
            },
        )
    }
}

/// Fails on `Flagged`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrictView {
    pub accounts: usize,
}

impl ViewInstance for StrictView {
    type Locator = GlobalInstanceLocator;

    fn create(_view_id: &str) -> Self {
        Self::default()
    }

    fn handlers() -> ViewHandlers<Self> {
        ViewHandlers::new()
            .on(|view: &mut StrictView, _event: AccountOpened| view.accounts += 1)
            .try_on(
                |_view: &mut StrictView, event: Flagged, _ctx: &mut ViewContext<'_>| {
                    anyhow::bail!("refusing flagged account: {}", event.reason)
                },
            )
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn in_memory() -> (Arc<InMemoryEventStore>, Arc<AggregateRootRepository>) {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(AggregateRootRepository::new(store.clone()));
    (store, repository)
}

pub fn open_account(
    repository: &Arc<AggregateRootRepository>,
    account_id: &str,
    owner: &str,
) -> EventSourcingResult<CommandResult> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let account = uow.get::<Account>(account_id, true)?;
    account.emit(
        &mut uow,
        AccountOpened {
            owner: owner.to_string(),
        },
    )?;
    uow.commit()
}

pub fn deposit(
    repository: &Arc<AggregateRootRepository>,
    account_id: &str,
    amount: i64,
) -> EventSourcingResult<CommandResult> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let account = uow.get::<Account>(account_id, false)?;
    account.emit(&mut uow, Deposited { amount })?;
    uow.commit()
}

pub fn withdraw(
    repository: &Arc<AggregateRootRepository>,
    account_id: &str,
    amount: i64,
) -> EventSourcingResult<CommandResult> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let account = uow.get::<Account>(account_id, false)?;
    account.emit(&mut uow, Withdrawn { amount })?;
    uow.commit()
}

pub fn flag(
    repository: &Arc<AggregateRootRepository>,
    account_id: &str,
    reason: &str,
) -> EventSourcingResult<CommandResult> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let account = uow.get::<Account>(account_id, false)?;
    account.emit(
        &mut uow,
        Flagged {
            reason: reason.to_string(),
        },
    )?;
    uow.commit()
}

pub fn record_balance(
    repository: &Arc<AggregateRootRepository>,
    ledger_id: &str,
    account_id: &str,
) -> EventSourcingResult<CommandResult> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let ledger = uow.get::<Ledger>(ledger_id, true)?;
    ledger.emit(
        &mut uow,
        BalanceRecorded {
            account_id: account_id.to_string(),
        },
    )?;
    uow.commit()
}

/// Current state of an account through a fresh unit of work
pub fn account_state(
    repository: &Arc<AggregateRootRepository>,
    account_id: &str,
) -> EventSourcingResult<Account> {
    let mut uow = UnitOfWork::new(Arc::clone(repository));
    let account = uow.get::<Account>(account_id, false)?;
    let state = account.state().clone();
    Ok(state)
}
