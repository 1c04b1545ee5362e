// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Accounting
//!
//! Per-identity usage records, the system hash index, and the upload catalog
//! they are reconciled against. All three live as nodes of the replicated
//! graph under protected prefixes:
//!
//! ```text
//! usage/{identity}              mbUsed, lastUpdated
//! uploads/{identity}/{hash}     sizeMb, uploadedAt
//! systemhash/{hash}             owner, recordedAt
//! ```
//!
//! ## Consistency
//!
//! The store offers no multi-key transactions. The ledger and the hash index
//! are independent, eventually consistent projections of the upload catalog;
//! [`Reconciler`] repairs drift between them. Reads are bounded and fall back
//! to defaults; writes surface their errors to the caller.

pub mod accounting;
pub mod reconcile;
pub mod system_hash;
pub mod uploads;
pub mod usage;

use std::time::Duration;

use chrono::Utc;

pub use accounting::{DeleteReceipt, QuotaDecision, StorageAccounting, UploadReceipt};
pub use reconcile::{ReconcileReport, Reconciler};
pub use system_hash::{SystemHashEntry, SystemHashIndex};
pub use uploads::{UploadCatalog, UploadEntry};
pub use usage::{LedgerWriteMode, UsageLedger, UsageRecord};

use crate::graph::StoreError;

/// Usage amounts are kept on a 1e-6 MB grid.
const MB_SCALE: f64 = 1_000_000.0;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount {0} MB: must be finite and non-negative")]
    InvalidAmount(f64),

    #[error("invalid key '{0}': must be non-empty and contain no '/'")]
    InvalidKey(String),

    #[error("upload {hash} not found for {identity}")]
    UploadNotFound { identity: String, hash: String },

    #[error("ledger write failed: {0}")]
    Write(#[source] StoreError),

    #[error("ledger read failed: {0}")]
    Read(#[source] StoreError),

    #[error("ledger read timed out after {0:?}")]
    ReadTimeout(Duration),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Snap an amount onto the ledger grid.
pub(crate) fn quantize(mb: f64) -> f64 {
    (mb * MB_SCALE).round() / MB_SCALE
}

pub(crate) fn validate_amount(mb: f64) -> LedgerResult<f64> {
    if mb.is_finite() && mb >= 0.0 {
        Ok(quantize(mb))
    } else {
        Err(LedgerError::InvalidAmount(mb))
    }
}

/// Identities and hashes become soul path segments.
pub(crate) fn validate_key(key: &str) -> LedgerResult<()> {
    if key.is_empty() || key.contains('/') {
        Err(LedgerError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_snaps_to_micro_mb() {
        assert_eq!(quantize(1.0000004), 1.0);
        assert_eq!(quantize(0.1 + 0.2), 0.3);
    }

    #[test]
    fn amounts_must_be_finite_and_non_negative() {
        assert!(validate_amount(0.0).is_ok());
        assert!(matches!(validate_amount(-0.5), Err(LedgerError::InvalidAmount(_))));
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn keys_are_single_segments() {
        assert!(validate_key("0xabc").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a/b").is_err());
    }
}
