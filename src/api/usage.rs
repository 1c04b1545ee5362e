// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    auth::AdminAuth,
    error::ApiError,
    ledger::{QuotaDecision, UsageRecord},
    models::QuotaCheckRequest,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/usage/{identity}",
    params(("identity" = String, Path, description = "Identity whose usage to read")),
    tag = "Usage",
    security(("bearer" = [])),
    responses((status = 200, body = UsageRecord))
)]
pub async fn get_usage(
    _auth: AdminAuth,
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Json<UsageRecord> {
    Json(state.ledger.record(&identity).await)
}

/// Advisory check; nothing is reserved.
#[utoipa::path(
    post,
    path = "/v1/usage/{identity}/quota-check",
    params(("identity" = String, Path, description = "Identity about to upload")),
    request_body = QuotaCheckRequest,
    tag = "Usage",
    security(("bearer" = [])),
    responses(
        (status = 200, body = QuotaDecision),
        (status = 400, description = "Invalid amount")
    )
)]
pub async fn check_quota(
    _auth: AdminAuth,
    Path(identity): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<QuotaCheckRequest>,
) -> Result<Json<QuotaDecision>, ApiError> {
    let quota = request.quota_mb.or(state.config.default_quota_mb);
    let decision = state
        .accounting
        .check_quota(&identity, request.incoming_mb, quota)
        .await?;
    Ok(Json(decision))
}
