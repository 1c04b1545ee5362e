// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the HTTP surface. Ledger and sweeper
//! reports ([`UsageRecord`](crate::ledger::UsageRecord),
//! [`SweepReport`](crate::sweeper::SweepReport), ...) are serialized as-is
//! and live next to the code that produces them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::UploadEntry;

// =============================================================================
// Graph ingress
// =============================================================================

/// Acknowledgment for peer ingress. Says nothing about the gate decision.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageAck {
    pub received: bool,
}

/// Result of an admin write applied inside the internal scope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminPutResponse {
    pub accepted: bool,
    pub applied: usize,
    pub failed: usize,
    /// Reason when not accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

// =============================================================================
// Uploads
// =============================================================================

/// Completion notice from the content pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadCompletedRequest {
    pub identity: String,
    /// Content identifier
    pub hash: String,
    pub size_mb: f64,
}

/// Upload acknowledgment.
///
/// The content already landed; `ledger_updated = false` means accounting
/// lagged behind and will be repaired by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadCompletedResponse {
    pub identity: String,
    pub hash: String,
    pub size_mb: f64,
    pub ledger_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mb_used: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadListResponse {
    pub identity: String,
    pub uploads: Vec<UploadEntry>,
    pub total_mb: f64,
}

// =============================================================================
// Quota / system hashes / API keys
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaCheckRequest {
    pub incoming_mb: f64,
    /// Overrides `DEFAULT_QUOTA_MB` when set
    #[serde(default)]
    pub quota_mb: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemHashList {
    pub count: usize,
    pub hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueApiKeyRequest {
    #[serde(default)]
    pub label: Option<String>,
}
