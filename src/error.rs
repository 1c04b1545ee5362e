// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::ApiKeyError;
use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InvalidAmount(_) | LedgerError::InvalidKey(_) => {
                Self::bad_request(err.to_string())
            }
            LedgerError::UploadNotFound { .. } => Self::not_found(err.to_string()),
            LedgerError::Write(_) | LedgerError::Read(_) | LedgerError::ReadTimeout(_) => {
                tracing::error!(error = %err, "Ledger store failure");
                Self::unavailable(err.to_string())
            }
        }
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        match &err {
            ApiKeyError::NotFound(_) => Self::not_found(err.to_string()),
            ApiKeyError::Store(_) => {
                tracing::error!(error = %err, "API key store failure");
                Self::unavailable(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StoreError;
    use axum::body::to_bytes;

    #[test]
    fn ledger_errors_map_to_status() {
        assert_eq!(
            ApiError::from(LedgerError::InvalidAmount(-1.0)).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LedgerError::UploadNotFound {
                identity: "u".into(),
                hash: "h".into()
            })
            .status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(LedgerError::Write(StoreError::NotReady)).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(LedgerError::ReadTimeout(std::time::Duration::from_secs(5))).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn missing_api_key_is_not_found() {
        let err = ApiError::from(ApiKeyError::NotFound("k1".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "API key k1 not found");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
