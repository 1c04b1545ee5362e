// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::{AdminSecretOnly, ApiKeyRegistry, IssuedApiKey},
    error::ApiError,
    models::IssueApiKeyRequest,
    state::AppState,
};

fn registry(state: &AppState) -> Result<&ApiKeyRegistry, ApiError> {
    state
        .api_keys
        .as_deref()
        .ok_or_else(|| ApiError::not_found("API keys are disabled"))
}

/// Issue a key. The plaintext is returned once and never stored.
#[utoipa::path(
    post,
    path = "/v1/api-keys",
    request_body = IssueApiKeyRequest,
    tag = "API Keys",
    security(("bearer" = [])),
    responses(
        (status = 201, body = IssuedApiKey),
        (status = 403, description = "API keys cannot issue API keys")
    )
)]
pub async fn issue_api_key(
    _auth: AdminSecretOnly,
    State(state): State<AppState>,
    Json(request): Json<IssueApiKeyRequest>,
) -> Result<(StatusCode, Json<IssuedApiKey>), ApiError> {
    let issued = registry(&state)?.issue(request.label).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

#[utoipa::path(
    delete,
    path = "/v1/api-keys/{key_id}",
    params(("key_id" = String, Path, description = "Identifier of the key to revoke")),
    tag = "API Keys",
    security(("bearer" = [])),
    responses(
        (status = 204),
        (status = 404, description = "Unknown key")
    )
)]
pub async fn revoke_api_key(
    _auth: AdminSecretOnly,
    Path(key_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    registry(&state)?.revoke(&key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::graph::InMemoryGraph;
    use std::sync::Arc;

    #[tokio::test]
    async fn issue_then_revoke() {
        let state = AppState::for_tests(Some("s")).await;

        let (status, Json(issued)) = issue_api_key(
            AdminSecretOnly,
            State(state.clone()),
            Json(IssueApiKeyRequest {
                label: Some("uploader".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued.label.as_deref(), Some("uploader"));

        let status = revoke_api_key(AdminSecretOnly, Path(issued.key_id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = revoke_api_key(AdminSecretOnly, Path(issued.key_id), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disabled_registry_is_not_found() {
        let config = RelayConfig {
            admin_secret: Some("s".into()),
            api_keys_enabled: false,
            ..RelayConfig::default()
        };
        let state = AppState::init(config, Arc::new(InMemoryGraph::new()))
            .await
            .unwrap();

        let err = issue_api_key(AdminSecretOnly, State(state), Json(IssueApiKeyRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
