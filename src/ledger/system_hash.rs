// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reverse index from content hash to the identity that uploaded it.
//!
//! Writes are best effort: upload and delete handlers use the detached
//! variants so a slow or failing index write never blocks the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{validate_key, LedgerError, LedgerResult};
use crate::gate::namespace::SYSTEM_HASH_PREFIX;
use crate::graph::{Fields, GraphStore, Node};

const OWNER_FIELD: &str = "owner";
const RECORDED_AT_FIELD: &str = "recordedAt";

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SystemHashEntry {
    pub hash: String,
    pub owner: String,
    pub recorded_at: i64,
}

impl SystemHashEntry {
    fn from_node(node: &Node) -> Option<Self> {
        let hash = node.soul.strip_prefix(SYSTEM_HASH_PREFIX)?;
        if hash.is_empty() || hash.contains('/') {
            return None;
        }
        Some(Self {
            hash: hash.to_string(),
            owner: node.str_field(OWNER_FIELD)?.to_string(),
            recorded_at: node.i64_field(RECORDED_AT_FIELD).unwrap_or(0),
        })
    }
}

fn hash_soul(hash: &str) -> String {
    format!("{SYSTEM_HASH_PREFIX}{hash}")
}

#[derive(Clone)]
pub struct SystemHashIndex {
    store: Arc<dyn GraphStore>,
    read_timeout: Duration,
}

impl SystemHashIndex {
    pub fn new(store: Arc<dyn GraphStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }

    pub async fn record(&self, hash: &str, owner: &str, recorded_at: i64) -> LedgerResult<()> {
        validate_key(hash)?;
        let mut fields = Fields::new();
        fields.insert(OWNER_FIELD.into(), json!(owner));
        fields.insert(RECORDED_AT_FIELD.into(), json!(recorded_at));
        self.store
            .put(&hash_soul(hash), fields)
            .await
            .map_err(LedgerError::Write)
    }

    pub async fn forget(&self, hash: &str) -> LedgerResult<()> {
        validate_key(hash)?;
        self.store
            .delete(&hash_soul(hash))
            .await
            .map_err(LedgerError::Write)
    }

    /// Entry for `hash`; `None` when absent or not readable in time.
    pub async fn get(&self, hash: &str) -> Option<SystemHashEntry> {
        match tokio::time::timeout(self.read_timeout, self.store.get(&hash_soul(hash))).await {
            Ok(Ok(node)) => node.as_ref().and_then(SystemHashEntry::from_node),
            Ok(Err(e)) => {
                tracing::warn!(hash, error = %e, "System hash read failed");
                None
            }
            Err(_) => {
                tracing::warn!(hash, "System hash read timed out");
                None
            }
        }
    }

    /// Every indexed entry; empty on timeout or read failure.
    pub async fn entries(&self) -> Vec<SystemHashEntry> {
        match tokio::time::timeout(
            self.read_timeout,
            self.store.scan_prefix(SYSTEM_HASH_PREFIX),
        )
        .await
        {
            Ok(Ok(nodes)) => nodes.iter().filter_map(SystemHashEntry::from_node).collect(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "System hash listing failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "System hash listing timed out"
                );
                Vec::new()
            }
        }
    }

    /// Indexed hashes, sorted.
    pub async fn list_all(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self.entries().await.into_iter().map(|e| e.hash).collect();
        hashes.sort();
        hashes
    }

    /// Record on a separate task; failures are logged, not returned.
    pub fn record_detached(&self, hash: String, owner: String, recorded_at: i64) {
        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.record(&hash, &owner, recorded_at).await {
                tracing::error!(hash = %hash, owner = %owner, error = %e, "Failed to record system hash");
            }
        });
    }

    /// Forget on a separate task; failures are logged, not returned.
    pub fn forget_detached(&self, hash: String) {
        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.forget(&hash).await {
                tracing::error!(hash = %hash, error = %e, "Failed to forget system hash");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::FaultyGraph;
    use crate::graph::InMemoryGraph;

    fn index() -> SystemHashIndex {
        SystemHashIndex::new(Arc::new(InMemoryGraph::new()), Duration::from_secs(1))
    }

    /// Let detached tasks run to completion.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn record_get_forget() {
        let index = index();
        index.record("abc", "0xalice", 42).await.unwrap();

        let entry = index.get("abc").await.unwrap();
        assert_eq!(entry.owner, "0xalice");
        assert_eq!(entry.recorded_at, 42);

        index.forget("abc").await.unwrap();
        assert!(index.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn list_all_is_sorted() {
        let index = index();
        index.record("zz", "a", 1).await.unwrap();
        index.record("aa", "b", 2).await.unwrap();
        assert_eq!(index.list_all().await, vec!["aa", "zz"]);
    }

    #[tokio::test]
    async fn detached_writes_land() {
        let index = index();
        index.record_detached("h1".into(), "0xbob".into(), 7);
        settle().await;
        assert_eq!(index.get("h1").await.unwrap().owner, "0xbob");

        index.forget_detached("h1".into());
        settle().await;
        assert!(index.get("h1").await.is_none());
    }

    #[tokio::test]
    async fn detached_failure_is_swallowed() {
        let store = Arc::new(FaultyGraph::new());
        store.set_fail_writes(true);
        let index = SystemHashIndex::new(store, Duration::from_secs(1));

        index.record_detached("h1".into(), "0xbob".into(), 7);
        settle().await;
        assert!(index.get("h1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn listing_times_out_to_empty() {
        let store = Arc::new(FaultyGraph::new().with_hanging_reads());
        let index = SystemHashIndex::new(store, Duration::from_secs(2));
        assert!(index.list_all().await.is_empty());
        assert!(index.get("h1").await.is_none());
    }
}
