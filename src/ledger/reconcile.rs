// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Reconciler
//!
//! Background pass that rebuilds the usage ledger and the system hash index
//! from the upload catalog. It repairs updates lost to the last-writer-wins
//! race, detached index writes that never landed, and half-finished upload or
//! delete handlers.
//!
//! ## Pass
//!
//! 1. Sum upload sizes per identity and overwrite usage records that differ
//!    from the sum. Identities with a record but no uploads are reset to zero.
//! 2. Index every cataloged hash that has no index entry.
//! 3. Re-own index entries whose owner no longer holds the upload, or forget
//!    them when nobody does.
//!
//! Individual write failures are counted and the pass continues.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{quantize, SystemHashIndex, UploadCatalog, UploadEntry, UsageLedger};
use crate::config::ReconcilePolicy;
use crate::graph::GraphStore;

/// Usage values closer than this are considered equal.
const DRIFT_TOLERANCE_MB: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub identities_checked: usize,
    pub usage_corrected: usize,
    pub hashes_restored: usize,
    pub hashes_reowned: usize,
    pub hashes_forgotten: usize,
    pub failed: usize,
    /// The store was not ready or the catalog could not be read
    pub skipped: bool,
}

pub struct Reconciler {
    store: Arc<dyn GraphStore>,
    catalog: Arc<UploadCatalog>,
    ledger: Arc<UsageLedger>,
    index: SystemHashIndex,
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn GraphStore>,
        catalog: Arc<UploadCatalog>,
        ledger: Arc<UsageLedger>,
        index: SystemHashIndex,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            ledger,
            index,
            policy,
        }
    }

    /// Run passes every `policy.interval` until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if !self.policy.enabled {
            info!("Ledger reconciler disabled");
            return;
        }
        info!(
            interval_secs = self.policy.interval.as_secs(),
            "Ledger reconciler starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Ledger reconciler shutting down");
                    return;
                }
            }
            self.reconcile().await;
        }
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if !self.store.is_ready() {
            report.skipped = true;
            return report;
        }

        let uploads = match self.catalog.all().await {
            Ok(uploads) => uploads,
            Err(e) => {
                warn!(error = %e, "Reconcile skipped: upload catalog unreadable");
                report.skipped = true;
                return report;
            }
        };

        self.reconcile_usage(&uploads, &mut report).await;
        self.reconcile_index(&uploads, &mut report).await;

        info!(
            identities = report.identities_checked,
            usage_corrected = report.usage_corrected,
            hashes_restored = report.hashes_restored,
            hashes_reowned = report.hashes_reowned,
            hashes_forgotten = report.hashes_forgotten,
            failed = report.failed,
            "Ledger reconcile complete"
        );
        report
    }

    async fn reconcile_usage(&self, uploads: &[UploadEntry], report: &mut ReconcileReport) {
        let mut expected: BTreeMap<&str, f64> = BTreeMap::new();
        for entry in uploads {
            *expected.entry(entry.identity.as_str()).or_default() += entry.size_mb;
        }

        let records = self.ledger.list_records().await;
        let recorded: HashSet<&str> = records.iter().map(|r| r.identity.as_str()).collect();
        for identity in &recorded {
            expected.entry(*identity).or_insert(0.0);
        }

        for (identity, total) in expected {
            report.identities_checked += 1;
            let total = quantize(total);
            let current = self.ledger.usage(identity).await;
            if (current - total).abs() <= DRIFT_TOLERANCE_MB {
                continue;
            }
            match self.ledger.overwrite(identity, total).await {
                Ok(_) => {
                    report.usage_corrected += 1;
                    info!(identity, from = current, to = total, "Usage corrected");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(identity, error = %e, "Failed to correct usage");
                }
            }
        }
    }

    async fn reconcile_index(&self, uploads: &[UploadEntry], report: &mut ReconcileReport) {
        // Earliest upload of a hash is its canonical owner
        let mut holders: BTreeMap<&str, Vec<&UploadEntry>> = BTreeMap::new();
        for entry in uploads {
            holders.entry(entry.hash.as_str()).or_default().push(entry);
        }
        for list in holders.values_mut() {
            list.sort_by_key(|e| e.uploaded_at);
        }

        let indexed = self.index.entries().await;
        let indexed_hashes: HashSet<&str> = indexed.iter().map(|e| e.hash.as_str()).collect();

        for (hash, list) in &holders {
            if indexed_hashes.contains(hash) {
                continue;
            }
            let owner = list[0];
            match self.index.record(hash, &owner.identity, owner.uploaded_at).await {
                Ok(()) => report.hashes_restored += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(hash, error = %e, "Failed to restore system hash");
                }
            }
        }

        for entry in &indexed {
            match holders.get(entry.hash.as_str()) {
                None => match self.index.forget(&entry.hash).await {
                    Ok(()) => report.hashes_forgotten += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(hash = %entry.hash, error = %e, "Failed to forget orphaned hash");
                    }
                },
                Some(list) if !list.iter().any(|u| u.identity == entry.owner) => {
                    let owner = list[0];
                    match self
                        .index
                        .record(&entry.hash, &owner.identity, owner.uploaded_at)
                        .await
                    {
                        Ok(()) => report.hashes_reowned += 1,
                        Err(e) => {
                            report.failed += 1;
                            warn!(hash = %entry.hash, error = %e, "Failed to re-own hash");
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}
