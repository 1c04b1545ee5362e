// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-identity storage usage ledger.
//!
//! `charge` and `release` are read-modify-write against the graph. In the
//! default [`LedgerWriteMode::LastWriterWins`] mode two concurrent updates of
//! the same identity can both read the same starting value, and one update
//! is lost; the reconciler repairs the record later. The
//! [`LedgerWriteMode::Serialized`] mode funnels updates of one identity
//! through a per-identity async mutex. Reads stay eventually consistent in
//! both modes.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{now_millis, quantize, validate_amount, validate_key, LedgerError, LedgerResult};
use crate::gate::namespace::USAGE_PREFIX;
use crate::graph::{Fields, GraphStore, Node};

const MB_USED_FIELD: &str = "mbUsed";
const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// How concurrent updates of one identity are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerWriteMode {
    /// Unsynchronized read-modify-write; racing updates may be lost.
    #[default]
    LastWriterWins,
    /// One writer at a time per identity.
    Serialized,
}

impl FromStr for LedgerWriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "last-writer-wins" | "lww" => Ok(LedgerWriteMode::LastWriterWins),
            "serialized" => Ok(LedgerWriteMode::Serialized),
            other => Err(format!(
                "unknown ledger write mode '{other}' (expected 'last-writer-wins' or 'serialized')"
            )),
        }
    }
}

/// Storage consumed by one identity.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UsageRecord {
    pub identity: String,
    pub mb_used: f64,
    /// Epoch millis of the last write; 0 when the record does not exist yet
    pub last_updated: i64,
}

impl UsageRecord {
    pub fn empty(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            mb_used: 0.0,
            last_updated: 0,
        }
    }

    fn from_node(identity: &str, node: &Node) -> Self {
        Self {
            identity: identity.to_string(),
            mb_used: node.f64_field(MB_USED_FIELD).unwrap_or(0.0).max(0.0),
            last_updated: node.i64_field(LAST_UPDATED_FIELD).unwrap_or(0),
        }
    }
}

fn usage_soul(identity: &str) -> String {
    format!("{USAGE_PREFIX}{identity}")
}

pub struct UsageLedger {
    store: Arc<dyn GraphStore>,
    read_timeout: Duration,
    mode: LedgerWriteMode,
    writers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn GraphStore>, read_timeout: Duration, mode: LedgerWriteMode) -> Self {
        Self {
            store,
            read_timeout,
            mode,
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> LedgerWriteMode {
        self.mode
    }

    /// Current usage in MB; zero when absent or when the read times out.
    pub async fn usage(&self, identity: &str) -> f64 {
        self.record(identity).await.mb_used
    }

    /// Current record; an empty record when absent or unreadable in time.
    pub async fn record(&self, identity: &str) -> UsageRecord {
        let soul = usage_soul(identity);
        match tokio::time::timeout(self.read_timeout, self.store.get(&soul)).await {
            Ok(Ok(Some(node))) => UsageRecord::from_node(identity, &node),
            Ok(Ok(None)) => UsageRecord::empty(identity),
            Ok(Err(e)) => {
                tracing::warn!(identity, error = %e, "Usage read failed, assuming zero");
                UsageRecord::empty(identity)
            }
            Err(_) => {
                tracing::warn!(
                    identity,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Usage read timed out, assuming zero"
                );
                UsageRecord::empty(identity)
            }
        }
    }

    /// Add `delta_mb` to the identity's usage. Returns the new total.
    pub async fn charge(&self, identity: &str, delta_mb: f64) -> LedgerResult<f64> {
        let delta = validate_amount(delta_mb)?;
        self.update(identity, |current| current + delta).await
    }

    /// Subtract `delta_mb`, clamping at zero. Returns the new total.
    pub async fn release(&self, identity: &str, delta_mb: f64) -> LedgerResult<f64> {
        let delta = validate_amount(delta_mb)?;
        self.update(identity, |current| (current - delta).max(0.0)).await
    }

    /// Replace the identity's usage outright (reconciliation).
    pub async fn overwrite(&self, identity: &str, mb: f64) -> LedgerResult<f64> {
        let mb = validate_amount(mb)?;
        self.update(identity, |_| mb).await
    }

    /// Every usage record currently resident; empty on timeout.
    pub async fn list_records(&self) -> Vec<UsageRecord> {
        match tokio::time::timeout(self.read_timeout, self.store.scan_prefix(USAGE_PREFIX)).await {
            Ok(Ok(nodes)) => nodes
                .iter()
                .filter_map(|node| {
                    let identity = node.soul.strip_prefix(USAGE_PREFIX)?;
                    (!identity.is_empty() && !identity.contains('/'))
                        .then(|| UsageRecord::from_node(identity, node))
                })
                .collect(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Usage listing failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("Usage listing timed out");
                Vec::new()
            }
        }
    }

    async fn update<F>(&self, identity: &str, apply: F) -> LedgerResult<f64>
    where
        F: FnOnce(f64) -> f64,
    {
        validate_key(identity)?;

        let writer = match self.mode {
            LedgerWriteMode::Serialized => Some(self.writer_for(identity)),
            LedgerWriteMode::LastWriterWins => None,
        };
        let _guard = match &writer {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let current = self.usage(identity).await;
        let next = quantize(apply(current).max(0.0));

        let mut fields = Fields::new();
        fields.insert(MB_USED_FIELD.into(), json!(next));
        fields.insert(LAST_UPDATED_FIELD.into(), json!(now_millis()));
        self.store
            .put(&usage_soul(identity), fields)
            .await
            .map_err(LedgerError::Write)?;

        tracing::debug!(identity, from = current, to = next, "Usage updated");
        Ok(next)
    }

    fn writer_for(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = self
            .writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writers.entry(identity.to_string()).or_default().clone()
    }
}
