// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::AdminAuth,
    gate::{InboundOutcome, MutationGate, MutationMessage},
    models::{AdminPutResponse, MessageAck},
    state::AppState,
};

/// Peer ingress. The gate decides; the peer never learns the outcome.
#[utoipa::path(
    post,
    path = "/v1/graph/messages",
    request_body = MutationMessage,
    tag = "Graph",
    responses((status = 202, body = MessageAck))
)]
pub async fn receive_message(
    State(state): State<AppState>,
    Json(message): Json<MutationMessage>,
) -> (StatusCode, Json<MessageAck>) {
    if let InboundOutcome::Dropped(reason) = state.relay.on_inbound(message).await {
        tracing::debug!(reason = ?reason, "Peer mutation dropped");
    }
    (StatusCode::ACCEPTED, Json(MessageAck { received: true }))
}

/// Service-originated write. Runs with the internal override raised so the
/// body does not need to carry the admin token again.
#[utoipa::path(
    post,
    path = "/v1/graph/admin-put",
    request_body = MutationMessage,
    tag = "Graph",
    security(("bearer" = [])),
    responses(
        (status = 200, body = AdminPutResponse),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn admin_put(
    AdminAuth(principal): AdminAuth,
    State(state): State<AppState>,
    Json(message): Json<MutationMessage>,
) -> Json<AdminPutResponse> {
    tracing::info!(principal = ?principal, souls = message.souls().count(), "Admin graph write");
    let outcome = MutationGate::internal_scope(state.relay.on_inbound(message)).await;

    Json(match outcome {
        InboundOutcome::Applied { applied, failed } => AdminPutResponse {
            accepted: true,
            applied,
            failed,
            rejected: None,
        },
        InboundOutcome::Dropped(reason) => AdminPutResponse {
            accepted: false,
            applied: 0,
            failed: 0,
            rejected: Some(format!("{reason:?}")),
        },
    })
}
