// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::AdminAuth,
    error::ApiError,
    ledger::{quantize, DeleteReceipt, LedgerError},
    models::{UploadCompletedRequest, UploadCompletedResponse, UploadListResponse},
    state::AppState,
};

/// Upload completion. The content is already stored, so the upload is
/// reported as successful even when ledger bookkeeping fails; the
/// inconsistency is logged and left to reconciliation.
#[utoipa::path(
    post,
    path = "/v1/uploads",
    request_body = UploadCompletedRequest,
    tag = "Uploads",
    security(("bearer" = [])),
    responses(
        (status = 201, body = UploadCompletedResponse),
        (status = 400, description = "Invalid identity, hash or size")
    )
)]
pub async fn upload_completed(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Json(request): Json<UploadCompletedRequest>,
) -> Result<(StatusCode, Json<UploadCompletedResponse>), ApiError> {
    let result = state
        .accounting
        .on_upload(&request.identity, &request.hash, request.size_mb)
        .await;

    let mb_used = match result {
        Ok(receipt) => Some(receipt.mb_used),
        Err(e @ (LedgerError::InvalidAmount(_) | LedgerError::InvalidKey(_))) => {
            return Err(e.into());
        }
        Err(e) => {
            tracing::error!(
                identity = %request.identity,
                hash = %request.hash,
                size_mb = request.size_mb,
                error = %e,
                "Upload stored but ledger bookkeeping failed"
            );
            None
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadCompletedResponse {
            identity: request.identity,
            hash: request.hash,
            size_mb: quantize(request.size_mb),
            ledger_updated: mb_used.is_some(),
            mb_used,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/uploads/{identity}",
    params(("identity" = String, Path, description = "Owner of the uploads")),
    tag = "Uploads",
    security(("bearer" = [])),
    responses((status = 200, body = UploadListResponse))
)]
pub async fn list_uploads(
    _auth: AdminAuth,
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UploadListResponse>, ApiError> {
    let uploads = state.catalog.list(&identity).await?;
    let total_mb = quantize(uploads.iter().map(|u| u.size_mb).sum());
    Ok(Json(UploadListResponse {
        identity,
        uploads,
        total_mb,
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/uploads/{identity}/{hash}",
    params(
        ("identity" = String, Path, description = "Owner of the upload"),
        ("hash" = String, Path, description = "Content identifier")
    ),
    tag = "Uploads",
    security(("bearer" = [])),
    responses(
        (status = 200, body = DeleteReceipt),
        (status = 404, description = "No such upload")
    )
)]
pub async fn delete_upload(
    _auth: AdminAuth,
    Path((identity, hash)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<DeleteReceipt>, ApiError> {
    let receipt = state.accounting.on_delete(&identity, &hash).await?;
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::config::RelayConfig;
    use crate::graph::testing::FaultyGraph;
    use std::sync::Arc;

    fn admin() -> AdminAuth {
        AdminAuth(Principal::AdminSecret)
    }

    fn request(identity: &str, hash: &str, size_mb: f64) -> UploadCompletedRequest {
        UploadCompletedRequest {
            identity: identity.into(),
            hash: hash.into(),
            size_mb,
        }
    }

    #[tokio::test]
    async fn upload_list_delete() {
        let state = AppState::for_tests(Some("s")).await;

        let (status, Json(created)) =
            upload_completed(admin(), State(state.clone()), Json(request("u1", "h1", 2.0)))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.ledger_updated);
        assert_eq!(created.mb_used, Some(2.0));

        let Json(list) = list_uploads(admin(), Path("u1".into()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(list.uploads.len(), 1);
        assert_eq!(list.total_mb, 2.0);

        let Json(receipt) = delete_upload(
            admin(),
            Path(("u1".into(), "h1".into())),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert_eq!(receipt.mb_used, 0.0);
    }

    #[tokio::test]
    async fn ledger_failure_still_reports_success() {
        let store = Arc::new(FaultyGraph::new());
        store.fail_soul("usage/u1");
        let config = RelayConfig {
            admin_secret: Some("s".into()),
            ..RelayConfig::default()
        };
        let state = AppState::init(config, store).await.unwrap();

        let (status, Json(created)) =
            upload_completed(admin(), State(state), Json(request("u1", "h1", 1.0)))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(!created.ledger_updated);
        assert_eq!(created.mb_used, None);
    }

    #[tokio::test]
    async fn invalid_upload_is_rejected() {
        let state = AppState::for_tests(Some("s")).await;
        let err = upload_completed(admin(), State(state), Json(request("u1", "a/b", 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_unknown_upload_is_not_found() {
        let state = AppState::for_tests(Some("s")).await;
        let err = delete_upload(admin(), Path(("u1".into(), "nope".into())), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
