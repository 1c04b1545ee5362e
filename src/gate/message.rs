// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wire shape of mutation messages exchanged with peers.
//!
//! ```json
//! { "put": { "app/posts/1": { "title": "hi" }, "app/old": null },
//!   "headers": { "token": "...", "Authorization": "Bearer ..." } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::graph::Fields;

/// Authentication headers carried by a mutation message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(
        default,
        rename = "Authorization",
        skip_serializing_if = "Option::is_none"
    )]
    pub authorization: Option<String>,
}

impl MessageHeaders {
    /// Credential presented by the message: `token` first, then
    /// `Authorization` with an optional `Bearer ` prefix.
    pub fn presented_token(&self) -> Option<&str> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token);
        }
        let auth = self.authorization.as_deref()?.trim_start();
        let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        (!token.is_empty()).then_some(token)
    }
}

/// A batch of graph writes, in message order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MutationMessage {
    /// soul → fields, or `null` to delete the soul
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub put: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MessageHeaders>,
}

/// One decoded write of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SoulWrite {
    Merge(Fields),
    Delete,
}

impl MutationMessage {
    /// Single-soul write, mostly for tests and internal callers.
    pub fn put_one(soul: impl Into<String>, fields: Fields) -> Self {
        let mut put = Map::new();
        put.insert(soul.into(), Value::Object(fields));
        Self {
            put: Some(put),
            headers: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Default::default).token = Some(token.into());
        self
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Default::default)
            .authorization = Some(value.into());
        self
    }

    /// Target souls in message order.
    pub fn souls(&self) -> impl Iterator<Item = &str> {
        self.put.iter().flat_map(|put| put.keys().map(String::as_str))
    }

    pub fn first_soul(&self) -> Option<&str> {
        self.souls().next()
    }

    pub fn presented_token(&self) -> Option<&str> {
        self.headers.as_ref()?.presented_token()
    }

    /// Decode the batch into writes. Non-object, non-null values are skipped.
    pub fn writes(&self) -> Vec<(String, SoulWrite)> {
        let Some(put) = &self.put else {
            return Vec::new();
        };
        put.iter()
            .filter_map(|(soul, value)| match value {
                Value::Null => Some((soul.clone(), SoulWrite::Delete)),
                Value::Object(fields) => Some((soul.clone(), SoulWrite::Merge(fields.clone()))),
                _ => None,
            })
            .collect()
    }
}
