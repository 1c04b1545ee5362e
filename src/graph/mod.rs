// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Replicated Graph Store Interface
//!
//! The replicated graph store is an external collaborator: its
//! synchronization and conflict resolution are not implemented here. This
//! module defines the narrow surface the relay layer needs from it.
//!
//! ## Node Model
//!
//! ```text
//! soul -> { field: scalar | { "#": other_soul } }
//! ```
//!
//! - Writing a node merges the given fields into the existing ones.
//! - Writing `null` for a field removes that field.
//! - Writing `null` for a whole soul deletes the node.
//!
//! ## Backends
//!
//! - [`InMemoryGraph`] - resident snapshot, used by default and in tests
//! - [`RedbGraph`] - persistent snapshot in an embedded redb file

pub mod memory;
pub mod redb_store;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use memory::InMemoryGraph;
pub use redb_store::RedbGraph;

/// Field map of a node, in insertion order.
pub type Fields = Map<String, Value>;

/// Field written by clients carrying the node's creation time (epoch millis).
pub const CREATED_AT_FIELD: &str = "createdAt";

/// One addressable node of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub soul: String,
    pub fields: Fields,
}

impl Node {
    pub fn new(soul: impl Into<String>, fields: Fields) -> Self {
        Self {
            soul: soul.into(),
            fields,
        }
    }

    /// Writer-supplied creation timestamp. Not trusted.
    pub fn created_at(&self) -> Option<i64> {
        match self.fields.get(CREATED_AT_FIELD)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }
}

/// Merge `incoming` into `existing`; `null` values remove fields.
pub(crate) fn merge_fields(existing: &mut Fields, incoming: Fields) {
    for (name, value) in incoming {
        if value.is_null() {
            existing.remove(&name);
        } else {
            existing.insert(name, value);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("graph store not initialized")]
    NotReady,

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Access to the replicated graph.
///
/// Reads may be slow or never resolve on a real replicated store; callers
/// that need a bounded wait wrap them in `tokio::time::timeout`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Whether the store has finished initializing.
    fn is_ready(&self) -> bool;

    async fn get(&self, soul: &str) -> StoreResult<Option<Node>>;

    /// Merge `fields` into the node at `soul`, creating it if absent.
    async fn put(&self, soul: &str, fields: Fields) -> StoreResult<()>;

    /// Write null to `soul`.
    async fn delete(&self, soul: &str) -> StoreResult<()>;

    /// Every resident node.
    async fn snapshot(&self) -> StoreResult<Vec<Node>>;

    /// Resident nodes whose soul starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<Node>>;
}
