// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Upload and delete completion handlers.
//!
//! Each handler touches three independent records (catalog entry, usage,
//! hash index) without a transaction. The catalog entry is written first so
//! the reconciler can rebuild the other two from it.
//!
//! The index entry of a hash belongs to its earliest current holder. A later
//! upload of the same hash leaves it alone; deleting the owner's copy hands
//! the entry to the next holder, and only the last copy forgets it.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::{
    now_millis, quantize, validate_amount, LedgerError, LedgerResult, SystemHashIndex,
    UploadCatalog, UploadEntry, UsageLedger,
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UploadReceipt {
    pub identity: String,
    pub hash: String,
    pub size_mb: f64,
    /// Usage after the charge
    pub mb_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeleteReceipt {
    pub identity: String,
    pub hash: String,
    pub released_mb: f64,
    pub mb_used: f64,
}

/// Advisory answer to "may this identity store `incoming_mb` more?".
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used_mb: f64,
    pub incoming_mb: f64,
    /// `None` when no quota applies
    pub quota_mb: Option<f64>,
    pub remaining_mb: Option<f64>,
}

pub struct StorageAccounting {
    catalog: Arc<UploadCatalog>,
    ledger: Arc<UsageLedger>,
    index: SystemHashIndex,
}

impl StorageAccounting {
    pub fn new(catalog: Arc<UploadCatalog>, ledger: Arc<UsageLedger>, index: SystemHashIndex) -> Self {
        Self {
            catalog,
            ledger,
            index,
        }
    }

    /// Record a completed upload and charge its size.
    ///
    /// Re-reporting an existing upload charges only the size difference.
    pub async fn on_upload(
        &self,
        identity: &str,
        hash: &str,
        size_mb: f64,
    ) -> LedgerResult<UploadReceipt> {
        let size_mb = validate_amount(size_mb)?;
        let previous = match self.catalog.get(identity, hash).await {
            Ok(previous) => previous,
            Err(LedgerError::ReadTimeout(after)) => {
                tracing::warn!(
                    identity,
                    hash,
                    timeout_ms = after.as_millis() as u64,
                    "Upload lookup timed out, charging as a new upload"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let uploaded_at = now_millis();

        self.catalog
            .add(&UploadEntry {
                identity: identity.to_string(),
                hash: hash.to_string(),
                size_mb,
                uploaded_at,
            })
            .await?;

        let previous_mb = previous.map(|e| e.size_mb).unwrap_or(0.0);
        let mb_used = if size_mb >= previous_mb {
            self.ledger
                .charge(identity, quantize(size_mb - previous_mb))
                .await?
        } else {
            self.ledger
                .release(identity, quantize(previous_mb - size_mb))
                .await?
        };

        self.claim_hash(identity, hash, uploaded_at).await;

        tracing::info!(identity, hash, size_mb, mb_used, "Upload accounted");
        Ok(UploadReceipt {
            identity: identity.to_string(),
            hash: hash.to_string(),
            size_mb,
            mb_used,
        })
    }

    /// Remove an upload and release its size.
    pub async fn on_delete(&self, identity: &str, hash: &str) -> LedgerResult<DeleteReceipt> {
        let entry = self
            .catalog
            .get(identity, hash)
            .await?
            .ok_or_else(|| LedgerError::UploadNotFound {
                identity: identity.to_string(),
                hash: hash.to_string(),
            })?;

        self.catalog.remove(identity, hash).await?;
        let mb_used = self.ledger.release(identity, entry.size_mb).await?;

        self.release_hash(identity, hash).await;

        tracing::info!(identity, hash, released_mb = entry.size_mb, mb_used, "Delete accounted");
        Ok(DeleteReceipt {
            identity: identity.to_string(),
            hash: hash.to_string(),
            released_mb: entry.size_mb,
            mb_used,
        })
    }

    /// Index `hash` under `identity` unless a current holder already owns it.
    async fn claim_hash(&self, identity: &str, hash: &str, uploaded_at: i64) {
        let Some(indexed) = self.index.get(hash).await else {
            self.index
                .record_detached(hash.to_string(), identity.to_string(), uploaded_at);
            return;
        };
        if indexed.owner == identity {
            return;
        }
        match self.catalog.get(&indexed.owner, hash).await {
            Ok(Some(_)) => {
                tracing::debug!(hash, owner = %indexed.owner, "Hash already owned, index kept");
            }
            Ok(None) => {
                tracing::debug!(hash, stale_owner = %indexed.owner, "Taking over stale hash entry");
                self.index
                    .record_detached(hash.to_string(), identity.to_string(), uploaded_at);
            }
            // Left for the reconciler
            Err(e) => tracing::warn!(hash, error = %e, "Could not check hash owner"),
        }
    }

    /// Hand the index entry of `hash` to the next holder, or forget it when
    /// `identity` held the last copy.
    async fn release_hash(&self, identity: &str, hash: &str) {
        if let Some(indexed) = self.index.get(hash).await {
            if indexed.owner != identity {
                tracing::debug!(hash, owner = %indexed.owner, "Hash owned elsewhere, index kept");
                return;
            }
        }
        match self.catalog.holders(hash).await {
            Ok(holders) => match holders.into_iter().find(|h| h.identity != identity) {
                Some(next) => {
                    tracing::debug!(hash, owner = %next.identity, "Hash re-owned");
                    self.index
                        .record_detached(hash.to_string(), next.identity, next.uploaded_at);
                }
                None => self.index.forget_detached(hash.to_string()),
            },
            Err(e) => tracing::warn!(hash, error = %e, "Could not look up other holders of hash"),
        }
    }

    pub async fn check_quota(
        &self,
        identity: &str,
        incoming_mb: f64,
        quota_mb: Option<f64>,
    ) -> LedgerResult<QuotaDecision> {
        let incoming_mb = validate_amount(incoming_mb)?;
        let used_mb = self.ledger.usage(identity).await;

        let Some(quota) = quota_mb else {
            return Ok(QuotaDecision {
                allowed: true,
                used_mb,
                incoming_mb,
                quota_mb: None,
                remaining_mb: None,
            });
        };

        let remaining = quantize((quota - used_mb).max(0.0));
        Ok(QuotaDecision {
            allowed: quantize(used_mb + incoming_mb) <= quota,
            used_mb,
            incoming_mb,
            quota_mb: Some(quota),
            remaining_mb: Some(remaining),
        })
    }
}
