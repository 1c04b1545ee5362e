// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Upload catalog: one node per stored object, keyed by identity and hash.
//! The ledger and the hash index are derived from it.
//!
//! Reads are bounded by the ledger read timeout. Unlike usage reads they do
//! not fall back to an empty answer: an empty catalog would tell the
//! reconciler to zero every usage record. A timeout is reported as
//! [`LedgerError::ReadTimeout`] and each caller picks its own default.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::{validate_amount, validate_key, LedgerError, LedgerResult};
use crate::gate::namespace::UPLOADS_PREFIX;
use crate::graph::{Fields, GraphStore, Node, StoreResult};

const SIZE_MB_FIELD: &str = "sizeMb";
const UPLOADED_AT_FIELD: &str = "uploadedAt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadEntry {
    pub identity: String,
    pub hash: String,
    pub size_mb: f64,
    pub uploaded_at: i64,
}

impl UploadEntry {
    fn from_node(node: &Node) -> Option<Self> {
        let rest = node.soul.strip_prefix(UPLOADS_PREFIX)?;
        let (identity, hash) = rest.split_once('/')?;
        if identity.is_empty() || hash.is_empty() || hash.contains('/') {
            return None;
        }
        Some(Self {
            identity: identity.to_string(),
            hash: hash.to_string(),
            size_mb: node.f64_field(SIZE_MB_FIELD)?.max(0.0),
            uploaded_at: node.i64_field(UPLOADED_AT_FIELD).unwrap_or(0),
        })
    }
}

fn upload_soul(identity: &str, hash: &str) -> String {
    format!("{UPLOADS_PREFIX}{identity}/{hash}")
}

pub struct UploadCatalog {
    store: Arc<dyn GraphStore>,
    read_timeout: Duration,
}

impl UploadCatalog {
    pub fn new(store: Arc<dyn GraphStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }

    pub async fn add(&self, entry: &UploadEntry) -> LedgerResult<()> {
        validate_key(&entry.identity)?;
        validate_key(&entry.hash)?;
        let size = validate_amount(entry.size_mb)?;

        let mut fields = Fields::new();
        fields.insert(SIZE_MB_FIELD.into(), json!(size));
        fields.insert(UPLOADED_AT_FIELD.into(), json!(entry.uploaded_at));
        self.store
            .put(&upload_soul(&entry.identity, &entry.hash), fields)
            .await
            .map_err(LedgerError::Write)
    }

    pub async fn get(&self, identity: &str, hash: &str) -> LedgerResult<Option<UploadEntry>> {
        validate_key(identity)?;
        validate_key(hash)?;
        let node = self.bounded(self.store.get(&upload_soul(identity, hash))).await?;
        Ok(node.as_ref().and_then(UploadEntry::from_node))
    }

    pub async fn remove(&self, identity: &str, hash: &str) -> LedgerResult<()> {
        validate_key(identity)?;
        validate_key(hash)?;
        self.store
            .delete(&upload_soul(identity, hash))
            .await
            .map_err(LedgerError::Write)
    }

    /// Uploads of one identity, oldest first.
    pub async fn list(&self, identity: &str) -> LedgerResult<Vec<UploadEntry>> {
        validate_key(identity)?;
        let prefix = format!("{UPLOADS_PREFIX}{identity}/");
        self.collect(&prefix).await
    }

    /// Every upload in the catalog.
    pub async fn all(&self) -> LedgerResult<Vec<UploadEntry>> {
        self.collect(UPLOADS_PREFIX).await
    }

    /// Identities holding `hash`, earliest upload first.
    pub async fn holders(&self, hash: &str) -> LedgerResult<Vec<UploadEntry>> {
        validate_key(hash)?;
        let mut holders: Vec<UploadEntry> = self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.hash == hash)
            .collect();
        holders.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        Ok(holders)
    }

    async fn collect(&self, prefix: &str) -> LedgerResult<Vec<UploadEntry>> {
        let nodes = self.bounded(self.store.scan_prefix(prefix)).await?;
        let mut entries: Vec<UploadEntry> =
            nodes.iter().filter_map(UploadEntry::from_node).collect();
        entries.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        Ok(entries)
    }

    async fn bounded<T>(&self, read: impl Future<Output = StoreResult<T>>) -> LedgerResult<T> {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(result) => result.map_err(LedgerError::Read),
            Err(_) => Err(LedgerError::ReadTimeout(self.read_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::FaultyGraph;
    use crate::graph::InMemoryGraph;

    fn catalog() -> UploadCatalog {
        UploadCatalog::new(Arc::new(InMemoryGraph::new()), Duration::from_secs(1))
    }

    fn entry(identity: &str, hash: &str, size_mb: f64, uploaded_at: i64) -> UploadEntry {
        UploadEntry {
            identity: identity.into(),
            hash: hash.into(),
            size_mb,
            uploaded_at,
        }
    }

    #[tokio::test]
    async fn add_get_remove() {
        let catalog = catalog();
        catalog.add(&entry("u1", "h1", 2.0, 10)).await.unwrap();

        let found = catalog.get("u1", "h1").await.unwrap().unwrap();
        assert_eq!(found.size_mb, 2.0);
        assert_eq!(found.uploaded_at, 10);

        catalog.remove("u1", "h1").await.unwrap();
        assert!(catalog.get("u1", "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_identity() {
        let catalog = catalog();
        catalog.add(&entry("u1", "b", 1.0, 20)).await.unwrap();
        catalog.add(&entry("u1", "a", 1.0, 10)).await.unwrap();
        catalog.add(&entry("u10", "c", 1.0, 5)).await.unwrap();

        let hashes: Vec<_> = catalog
            .list("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.hash)
            .collect();
        assert_eq!(hashes, vec!["a", "b"]);
        assert_eq!(catalog.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_path_segments() {
        let catalog = catalog();
        assert!(matches!(
            catalog.add(&entry("u1", "a/b", 1.0, 0)).await,
            Err(LedgerError::InvalidKey(_))
        ));
        assert!(matches!(
            catalog.add(&entry("u1", "h", -1.0, 0)).await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn holders_are_ordered_by_upload_time() {
        let catalog = catalog();
        catalog.add(&entry("u2", "shared", 1.0, 20)).await.unwrap();
        catalog.add(&entry("u1", "shared", 1.0, 10)).await.unwrap();
        catalog.add(&entry("u3", "other", 1.0, 5)).await.unwrap();

        let holders: Vec<_> = catalog
            .holders("shared")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.identity)
            .collect();
        assert_eq!(holders, vec!["u1", "u2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_reads_time_out() {
        let store = Arc::new(FaultyGraph::new().with_hanging_reads());
        let catalog = UploadCatalog::new(store, Duration::from_secs(3));

        assert!(matches!(
            catalog.get("u1", "h1").await,
            Err(LedgerError::ReadTimeout(_))
        ));
        assert!(matches!(
            catalog.list("u1").await,
            Err(LedgerError::ReadTimeout(_))
        ));
        assert!(matches!(catalog.all().await, Err(LedgerError::ReadTimeout(_))));
    }
}
