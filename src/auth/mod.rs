// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Shared-secret authentication for the relay.
//!
//! ## Credentials
//!
//! - **Admin secret** (`ADMIN_SECRET`): one reference secret, hashed once at
//!   startup. Peers present it in the `token` or `Authorization` header of
//!   mutation messages; operators present it on admin HTTP routes.
//! - **API keys** (combined mode): issued by the admin, persisted as digests
//!   only, accepted on admin routes except key management itself.
//!
//! ## Security
//!
//! - Presented credentials are hashed and compared in constant time
//! - A missing admin secret is a configuration error (503), never accept-all

pub mod api_keys;
pub mod error;
pub mod extractor;
pub mod secret;

pub use api_keys::{ApiKeyError, ApiKeyRegistry, IssuedApiKey};
pub use error::AuthError;
pub use extractor::{AdminAuth, AdminSecretOnly, Principal};
pub use secret::{constant_time_eq, SecretComparator, SecretDigest};
