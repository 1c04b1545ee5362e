// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-demand runs of the background jobs, plus the hash index listing.

use axum::{extract::State, Json};

use crate::{
    auth::AdminAuth,
    ledger::ReconcileReport,
    models::SystemHashList,
    state::AppState,
    sweeper::SweepReport,
};

#[utoipa::path(
    get,
    path = "/v1/system-hashes",
    tag = "Maintenance",
    security(("bearer" = [])),
    responses((status = 200, body = SystemHashList))
)]
pub async fn list_system_hashes(_auth: AdminAuth, State(state): State<AppState>) -> Json<SystemHashList> {
    let hashes = state.hash_index.list_all().await;
    Json(SystemHashList {
        count: hashes.len(),
        hashes,
    })
}

/// Sweep now. Returns `already_running` instead of waiting on a scheduled sweep.
#[utoipa::path(
    post,
    path = "/v1/gc/sweep",
    tag = "Maintenance",
    security(("bearer" = [])),
    responses((status = 200, body = SweepReport))
)]
pub async fn sweep_now(AdminAuth(principal): AdminAuth, State(state): State<AppState>) -> Json<SweepReport> {
    tracing::info!(principal = ?principal, "Manual sweep requested");
    Json(state.sweeper.sweep().await)
}

#[utoipa::path(
    post,
    path = "/v1/ledger/reconcile",
    tag = "Maintenance",
    security(("bearer" = [])),
    responses((status = 200, body = ReconcileReport))
)]
pub async fn reconcile_now(
    AdminAuth(principal): AdminAuth,
    State(state): State<AppState>,
) -> Json<ReconcileReport> {
    tracing::info!(principal = ?principal, "Manual reconcile requested");
    Json(state.reconciler.reconcile().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::graph::{Fields, GraphStore};

    fn admin() -> AdminAuth {
        AdminAuth(Principal::AdminSecret)
    }

    #[tokio::test]
    async fn sweep_keeps_accounting_data() {
        let state = AppState::for_tests(Some("s")).await;
        state.accounting.on_upload("u1", "h1", 1.0).await.unwrap();
        state.store.put("app/tmp", Fields::new()).await.unwrap();

        let Json(report) = sweep_now(admin(), State(state.clone())).await;
        assert_eq!(report.removed, 1);
        assert_eq!(state.ledger.usage("u1").await, 1.0);
        assert!(state.catalog.get("u1", "h1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reconcile_restores_index_for_listing() {
        let state = AppState::for_tests(Some("s")).await;
        state.accounting.on_upload("u1", "h1", 1.0).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // Simulate a detached index write that never landed
        state.hash_index.forget("h1").await.unwrap();

        let Json(report) = reconcile_now(admin(), State(state.clone())).await;
        assert!(!report.skipped);

        let Json(list) = list_system_hashes(admin(), State(state)).await;
        assert_eq!(list.hashes, vec!["h1"]);
        assert_eq!(list.count, 1);
    }
}
