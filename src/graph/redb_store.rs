// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent graph snapshot backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `nodes`: soul → JSON-serialized field map
//!
//! redb calls are blocking, so every operation runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{merge_fields, Fields, GraphStore, Node, StoreResult};

/// soul → serialized fields (JSON bytes).
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Embedded persistent graph snapshot.
#[derive(Clone)]
pub struct RedbGraph {
    db: Arc<Database>,
}

impl RedbGraph {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(NODES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn get_blocking(db: &Database, soul: &str) -> StoreResult<Option<Node>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        match table.get(soul)? {
            Some(value) => {
                let fields: Fields = serde_json::from_slice(value.value())?;
                Ok(Some(Node::new(soul, fields)))
            }
            None => Ok(None),
        }
    }

    fn put_blocking(db: &Database, soul: &str, incoming: Fields) -> StoreResult<()> {
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(NODES)?;

            // Read existing value before mutating
            let existing_bytes = table.get(soul)?.map(|v| v.value().to_vec());
            let mut fields: Fields = match existing_bytes {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => Fields::new(),
            };
            merge_fields(&mut fields, incoming);

            let json = serde_json::to_vec(&fields)?;
            table.insert(soul, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_blocking(db: &Database, soul: &str) -> StoreResult<()> {
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(NODES)?;
            table.remove(soul)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn scan_blocking(db: &Database, prefix: &str) -> StoreResult<Vec<Node>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(NODES)?;

        let mut nodes = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            let soul = key.value();
            if !soul.starts_with(prefix) {
                break;
            }
            let fields: Fields = serde_json::from_slice(value.value())?;
            nodes.push(Node::new(soul, fields));
        }
        Ok(nodes)
    }
}

#[async_trait]
impl GraphStore for RedbGraph {
    fn is_ready(&self) -> bool {
        true
    }

    async fn get(&self, soul: &str) -> StoreResult<Option<Node>> {
        let db = self.db.clone();
        let soul = soul.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&db, &soul)).await?
    }

    async fn put(&self, soul: &str, fields: Fields) -> StoreResult<()> {
        let db = self.db.clone();
        let soul = soul.to_string();
        tokio::task::spawn_blocking(move || Self::put_blocking(&db, &soul, fields)).await?
    }

    async fn delete(&self, soul: &str) -> StoreResult<()> {
        let db = self.db.clone();
        let soul = soul.to_string();
        tokio::task::spawn_blocking(move || Self::delete_blocking(&db, &soul)).await?
    }

    async fn snapshot(&self) -> StoreResult<Vec<Node>> {
        self.scan_prefix("").await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<Node>> {
        let db = self.db.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || Self::scan_blocking(&db, &prefix)).await?
    }
}
