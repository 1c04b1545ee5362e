// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::IssuedApiKey,
    gate::{MessageHeaders, MutationMessage},
    ledger::{DeleteReceipt, QuotaDecision, ReconcileReport, UploadEntry, UsageRecord},
    models::{
        AdminPutResponse, IssueApiKeyRequest, MessageAck, QuotaCheckRequest, SystemHashList,
        UploadCompletedRequest, UploadCompletedResponse, UploadListResponse,
    },
    state::AppState,
    sweeper::SweepReport,
};

pub mod api_keys;
pub mod graph;
pub mod health;
pub mod maintenance;
pub mod uploads;
pub mod usage;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/graph/messages", post(graph::receive_message))
        .route("/graph/admin-put", post(graph::admin_put))
        .route("/usage/{identity}", get(usage::get_usage))
        .route("/usage/{identity}/quota-check", post(usage::check_quota))
        .route("/uploads", post(uploads::upload_completed))
        .route("/uploads/{identity}", get(uploads::list_uploads))
        .route("/uploads/{identity}/{hash}", delete(uploads::delete_upload))
        .route("/system-hashes", get(maintenance::list_system_hashes))
        .route("/gc/sweep", post(maintenance::sweep_now))
        .route("/ledger/reconcile", post(maintenance::reconcile_now))
        .route("/api-keys", post(api_keys::issue_api_key))
        .route("/api-keys/{key_id}", delete(api_keys::revoke_api_key))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        graph::receive_message,
        graph::admin_put,
        usage::get_usage,
        usage::check_quota,
        uploads::upload_completed,
        uploads::list_uploads,
        uploads::delete_upload,
        maintenance::list_system_hashes,
        maintenance::sweep_now,
        maintenance::reconcile_now,
        api_keys::issue_api_key,
        api_keys::revoke_api_key
    ),
    components(
        schemas(
            MutationMessage,
            MessageHeaders,
            MessageAck,
            AdminPutResponse,
            UsageRecord,
            QuotaCheckRequest,
            QuotaDecision,
            UploadEntry,
            UploadCompletedRequest,
            UploadCompletedResponse,
            UploadListResponse,
            DeleteReceipt,
            SystemHashList,
            SweepReport,
            ReconcileReport,
            IssueApiKeyRequest,
            IssuedApiKey
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Graph", description = "Mutation ingress from peers and the service"),
        (name = "Usage", description = "Per-identity storage usage and quota checks"),
        (name = "Uploads", description = "Upload completion and deletion accounting"),
        (name = "Maintenance", description = "Sweeps, reconciliation and the hash index"),
        (name = "API Keys", description = "API key issuing and revocation")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "router-secret";

    async fn app() -> (Router, AppState) {
        let state = AppState::for_tests(Some(SECRET)).await;
        (router(state.clone()), state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = auth {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (app, _) = app().await;
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn liveness_needs_no_auth_and_echoes_request_id() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn admin_routes_require_credentials() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/usage/u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error_code"], "missing_auth_header");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/usage/u1")
                    .header("token", SECRET)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["mb_used"], 0.0);
    }

    #[tokio::test]
    async fn admin_routes_unavailable_without_secret() {
        let state = AppState::for_tests(None).await;
        let response = router(state)
            .oneshot(json_request("POST", "/v1/gc/sweep", Some("guess"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn upload_flow_over_http() {
        let (app, state) = app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/uploads",
                Some(SECRET),
                json!({ "identity": "0xalice", "hash": "cid1", "size_mb": 2.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(state.ledger.usage("0xalice").await, 2.0);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/uploads/0xalice/cid1")
                    .header("authorization", format!("Bearer {SECRET}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.ledger.usage("0xalice").await, 0.0);
    }

    #[tokio::test]
    async fn api_key_works_on_admin_routes_until_revoked() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/api-keys", Some(SECRET), json!({ "label": "ci" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let issued = body_json(response).await;
        let key = issued["api_key"].as_str().unwrap().to_string();
        let key_id = issued["key_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/gc/sweep", Some(&key), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Keys cannot mint keys
        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/api-keys", Some(&key), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/api-keys/{key_id}"))
                    .header("authorization", format!("Bearer {SECRET}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(json_request("POST", "/v1/gc/sweep", Some(&key), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn peer_ingress_always_accepted() {
        let (app, _) = app().await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/graph/messages",
                None,
                json!({ "put": { "app/x": { "a": 1 } } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn openapi_lists_admin_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/uploads/{identity}/{hash}"));
        assert!(doc.paths.paths.contains_key("/v1/gc/sweep"));
    }
}
