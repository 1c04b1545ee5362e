// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for admin-authenticated routes.
//!
//! ```rust,ignore
//! async fn sweep_now(AdminAuth(principal): AdminAuth, State(state): State<AppState>) { .. }
//! ```
//!
//! The credential is read from `Authorization: Bearer <credential>` or, as
//! peers send it, from a bare `token: <credential>` header.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::api_keys::API_KEY_PREFIX;
use super::AuthError;
use crate::state::AppState;

/// Header peers use to carry the admin token.
pub const TOKEN_HEADER: &str = "token";

/// Who made an admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    AdminSecret,
    ApiKey(String),
}

/// Admin secret or, in combined mode, a valid API key.
pub struct AdminAuth(pub Principal);

/// Admin secret only. API keys are refused with 403.
pub struct AdminSecretOnly;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = presented_credential(parts)?;
        authenticate(&credential, state).map(AdminAuth)
    }
}

impl FromRequestParts<AppState> for AdminSecretOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = presented_credential(parts)?;
        match authenticate(&credential, state)? {
            Principal::AdminSecret => Ok(AdminSecretOnly),
            Principal::ApiKey(key_id) => {
                tracing::warn!(key_id = %key_id, "API key used on admin-secret-only route");
                Err(AuthError::InsufficientPermissions)
            }
        }
    }
}

fn presented_credential(parts: &Parts) -> Result<String, AuthError> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;
        return Ok(token.to_string());
    }

    let value = parts
        .headers
        .get(TOKEN_HEADER)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .trim();
    if value.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }
    Ok(value.to_string())
}

fn authenticate(credential: &str, state: &AppState) -> Result<Principal, AuthError> {
    if credential.starts_with(API_KEY_PREFIX) {
        if let Some(registry) = &state.api_keys {
            return registry
                .validate(credential)
                .map(Principal::ApiKey)
                .ok_or(AuthError::InvalidCredentials);
        }
    }

    if state.comparator.verify_admin(credential)? {
        Ok(Principal::AdminSecret)
    } else {
        Err(AuthError::InvalidCredentials)
    }
}
