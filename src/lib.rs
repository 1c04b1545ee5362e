// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Graph Relay Gate - write authorization and storage accounting for a
//! replicated graph relay.
//!
//! ## Modules
//!
//! - `gate` - Mutation gate, namespace classification, peer relay hook
//! - `auth` - Admin secret comparison, API keys, HTTP extractors
//! - `graph` - Graph store abstraction (in-memory and redb backends)
//! - `ledger` - Usage ledger, system hash index, upload catalog, reconciliation
//! - `sweeper` - Periodic retention sweep
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod graph;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod state;
pub mod sweeper;
