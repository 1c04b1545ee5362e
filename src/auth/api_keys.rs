// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hashed API keys for the combined admin mode.
//!
//! Keys look like `rgk_<key_id>_<secret>`. Only the SHA-256 digest of the
//! whole key is persisted, under `apikeys/<key_id>`; the plaintext is
//! returned once by [`ApiKeyRegistry::issue`]. Those souls classify as
//! `SoulClass::Credential`, so peers cannot write them without the admin
//! token.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::secret::SecretDigest;
use crate::gate::namespace::API_KEYS_PREFIX;
use crate::graph::{Fields, GraphStore, StoreError, CREATED_AT_FIELD};
use crate::ledger::now_millis;

pub const API_KEY_PREFIX: &str = "rgk_";

const DIGEST_FIELD: &str = "digest";
const LABEL_FIELD: &str = "label";
const KEY_ID_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("API key {0} not found")]
    NotFound(String),

    #[error("API key storage error: {0}")]
    Store(#[from] StoreError),
}

/// A freshly issued key. `api_key` is never shown again.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedApiKey {
    pub key_id: String,
    pub api_key: String,
    pub label: Option<String>,
    pub created_at: i64,
}

pub struct ApiKeyRegistry {
    store: Arc<dyn GraphStore>,
    digests: RwLock<HashMap<String, SecretDigest>>,
}

impl ApiKeyRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            digests: RwLock::new(HashMap::new()),
        }
    }

    /// Load persisted key digests. Returns the number loaded.
    pub async fn load(&self) -> Result<usize, ApiKeyError> {
        let nodes = self.store.scan_prefix(API_KEYS_PREFIX).await?;
        let mut loaded = HashMap::new();
        for node in &nodes {
            let Some(key_id) = node.soul.strip_prefix(API_KEYS_PREFIX) else {
                continue;
            };
            match node.str_field(DIGEST_FIELD).and_then(SecretDigest::from_hex) {
                Some(digest) => {
                    loaded.insert(key_id.to_string(), digest);
                }
                None => tracing::warn!(key_id, "Skipping API key with unreadable digest"),
            }
        }

        let count = loaded.len();
        *self
            .digests
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = loaded;
        Ok(count)
    }

    pub async fn issue(&self, label: Option<String>) -> Result<IssuedApiKey, ApiKeyError> {
        let key_id: String = Uuid::new_v4().simple().to_string()[..KEY_ID_LEN].to_string();
        let secret = Uuid::new_v4().simple().to_string();
        let api_key = format!("{API_KEY_PREFIX}{key_id}_{secret}");
        let digest = SecretDigest::of(&api_key);
        let created_at = now_millis();

        let mut fields = Fields::new();
        fields.insert(DIGEST_FIELD.into(), json!(digest.to_hex()));
        fields.insert(CREATED_AT_FIELD.into(), json!(created_at));
        if let Some(label) = &label {
            fields.insert(LABEL_FIELD.into(), json!(label));
        }
        self.store
            .put(&format!("{API_KEYS_PREFIX}{key_id}"), fields)
            .await?;

        self.digests
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key_id.clone(), digest);

        tracing::info!(key_id = %key_id, label = ?label, "API key issued");
        Ok(IssuedApiKey {
            key_id,
            api_key,
            label,
            created_at,
        })
    }

    pub async fn revoke(&self, key_id: &str) -> Result<(), ApiKeyError> {
        if !self.contains(key_id) {
            return Err(ApiKeyError::NotFound(key_id.to_string()));
        }
        self.store
            .delete(&format!("{API_KEYS_PREFIX}{key_id}"))
            .await?;
        self.digests
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key_id);

        tracing::info!(key_id, "API key revoked");
        Ok(())
    }

    /// Key id of a valid presented key.
    pub fn validate(&self, presented: &str) -> Option<String> {
        let (key_id, _) = presented.strip_prefix(API_KEY_PREFIX)?.split_once('_')?;
        let digests = self
            .digests
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = digests.get(key_id)?;
        stored
            .matches(&SecretDigest::of(presented))
            .then(|| key_id.to_string())
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.digests
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key_id)
    }
}
