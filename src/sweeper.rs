// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Retention Sweeper
//!
//! Background task that reclaims unprotected nodes from the graph.
//!
//! ## Strategy
//!
//! After `initial_delay` (default 30 s, giving the store time to sync) and
//! then every `interval` (default 1 h) the sweeper:
//! 1. Takes a snapshot of every resident node.
//! 2. Skips nodes under a protected namespace.
//! 3. Deletes the rest, either unconditionally (`PurgeUnprotected`) or when
//!    their `createdAt` is older than the configured age (`MaxAge`). Nodes
//!    without `createdAt` are kept in age mode.
//!
//! Deletion failures are counted and the sweep moves on. The sweeper yields
//! to the runtime every [`SWEEP_YIELD_EVERY`] nodes so large graphs do not
//! starve request handling.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the ledger reconciler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::{GcPolicy, Retention};
use crate::gate::NamespacePolicy;
use crate::graph::GraphStore;
use crate::ledger::now_millis;

/// Nodes processed between cooperative yields.
pub const SWEEP_YIELD_EVERY: usize = 256;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub skipped_protected: usize,
    /// Age mode only: too young or no `createdAt`
    pub skipped_fresh: usize,
    pub failed: usize,
    /// Store not initialized; nothing was scanned
    pub not_ready: bool,
    /// Another sweep was in progress
    pub already_running: bool,
}

pub struct RetentionSweeper {
    store: Arc<dyn GraphStore>,
    namespaces: NamespacePolicy,
    policy: GcPolicy,
    running: AtomicBool,
}

/// Clears the running flag when a sweep ends, including on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn GraphStore>, namespaces: NamespacePolicy, policy: GcPolicy) -> Self {
        Self {
            store,
            namespaces,
            policy,
            running: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> GcPolicy {
        self.policy
    }

    /// Run the sweeper loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if !self.policy.enabled {
            info!("Retention sweeper disabled");
            return;
        }
        info!(
            initial_delay_secs = self.policy.initial_delay.as_secs(),
            interval_secs = self.policy.interval.as_secs(),
            retention = ?self.policy.retention,
            "Retention sweeper starting"
        );

        let mut wait = self.policy.initial_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown.cancelled() => {
                    info!("Retention sweeper shutting down");
                    return;
                }
            }
            self.sweep().await;
            wait = self.policy.interval;
        }
    }

    /// Execute one sweep over the current snapshot.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in progress, skipping");
            report.already_running = true;
            return report;
        }
        let _guard = RunningGuard(&self.running);

        if !self.store.is_ready() {
            debug!("Graph store not ready, skipping sweep");
            report.not_ready = true;
            return report;
        }

        let nodes = match self.store.snapshot().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Sweep aborted: snapshot failed");
                return report;
            }
        };

        let now = now_millis();
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 && i % SWEEP_YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            report.scanned += 1;

            if !self.namespaces.classify(&node.soul).is_sweepable() {
                report.skipped_protected += 1;
                continue;
            }

            if let Retention::MaxAge(max_age) = self.policy.retention {
                let expired = node
                    .created_at()
                    .is_some_and(|created| now.saturating_sub(created) > max_age.as_millis() as i64);
                if !expired {
                    report.skipped_fresh += 1;
                    continue;
                }
            }

            match self.store.delete(&node.soul).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(soul = %node.soul, error = %e, "Sweep failed to delete node");
                }
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            skipped_protected = report.skipped_protected,
            skipped_fresh = report.skipped_fresh,
            failed = report.failed,
            "Sweep complete"
        );
        report
    }
}
