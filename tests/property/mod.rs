// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! - `store_ordering`: global and per-aggregate ordering of the event store
//! - `replay`: hydration and historical loads against a reference model
//! - `grouping`: dispatch grouping of a page of events

mod grouping;
mod replay;
mod store_ordering;
