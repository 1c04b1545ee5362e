// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Soul classification against the protected-namespace policy.
//!
//! | Class | Write check | Sweep |
//! |-------|-------------|-------|
//! | `Credential` | admin token required, always | exempt |
//! | `Protected` | exempt | exempt |
//! | `InternalGunOperation` | exempt | swept |
//! | `UserWritable` | admin token required | swept |
//!
//! `Credential` souls (`apikeys/`) are classified before the configured
//! prefixes, so no protected-namespace list can make them token-exempt.

use std::sync::Arc;

use uuid::Uuid;

/// Soul prefix holding per-identity usage records.
pub const USAGE_PREFIX: &str = "usage/";
/// Soul prefix holding per-identity upload entries.
pub const UPLOADS_PREFIX: &str = "uploads/";
/// Soul prefix holding the system hash index.
pub const SYSTEM_HASH_PREFIX: &str = "systemhash/";
/// Soul prefix holding API key digests. Never part of the protected list.
pub const API_KEYS_PREFIX: &str = "apikeys/";

/// Accounting prefixes that must always be protected from the sweeper.
pub const RESERVED_PREFIXES: [&str; 3] = [USAGE_PREFIX, UPLOADS_PREFIX, SYSTEM_HASH_PREFIX];

/// Default protected namespaces: user identity subtrees, root pointers,
/// relay telemetry, then the reserved accounting prefixes.
pub const DEFAULT_PROTECTED_NAMESPACES: [&str; 6] = [
    "~",
    "root",
    "relays/",
    USAGE_PREFIX,
    UPLOADS_PREFIX,
    SYSTEM_HASH_PREFIX,
];

/// Policy class of a soul.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoulClass {
    /// Stored credential material
    Credential,
    /// Matches a protected prefix
    Protected,
    /// Store-internal bookkeeping
    InternalGunOperation,
    /// Application data
    UserWritable,
}

impl SoulClass {
    /// Whether writes to this class skip the token check.
    pub fn bypasses_write_check(self) -> bool {
        matches!(self, SoulClass::Protected | SoulClass::InternalGunOperation)
    }

    /// Whether the task-scoped internal override may stand in for a token.
    pub fn honors_internal_override(self) -> bool {
        matches!(self, SoulClass::UserWritable)
    }

    /// Whether the sweeper may reclaim this class.
    pub fn is_sweepable(self) -> bool {
        !matches!(self, SoulClass::Protected | SoulClass::Credential)
    }
}

/// Ordered, immutable list of protected soul prefixes.
#[derive(Debug, Clone)]
pub struct NamespacePolicy {
    prefixes: Arc<[String]>,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTED_NAMESPACES.iter().map(|p| p.to_string()))
    }
}

impl NamespacePolicy {
    /// Build a policy from configured prefixes.
    ///
    /// Empty prefixes are dropped (they would match every soul). Reserved
    /// accounting prefixes missing from the list are appended.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();

        for reserved in RESERVED_PREFIXES {
            if !list.iter().any(|p| reserved.starts_with(p.as_str())) {
                tracing::warn!(
                    prefix = reserved,
                    "Reserved accounting prefix missing from protected namespaces; appending"
                );
                list.push(reserved.to_string());
            }
        }

        Self {
            prefixes: list.into(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// First protected prefix matching `soul`.
    pub fn matching_prefix(&self, soul: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| soul.starts_with(p.as_str()))
            .map(String::as_str)
    }

    pub fn is_protected(&self, soul: &str) -> bool {
        self.matching_prefix(soul).is_some()
    }

    /// Classify a soul.
    pub fn classify(&self, soul: &str) -> SoulClass {
        if soul.starts_with(API_KEYS_PREFIX) {
            SoulClass::Credential
        } else if self.is_protected(soul) {
            SoulClass::Protected
        } else if looks_internal(soul) {
            SoulClass::InternalGunOperation
        } else {
            SoulClass::UserWritable
        }
    }
}

/// Store bookkeeping souls: no path separator, UUID-shaped, or
/// hash-addressed (`#` prefix).
fn looks_internal(soul: &str) -> bool {
    !soul.contains('/') || soul.starts_with('#') || Uuid::try_parse(soul).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_protects_reserved_prefixes() {
        let policy = NamespacePolicy::default();
        for soul in [
            "~@alice",
            "~pubkey/profile",
            "root",
            "relays/r1/pulse",
            "usage/0xabc",
            "uploads/0xabc/QmHash",
            "systemhash/QmHash",
        ] {
            assert_eq!(policy.classify(soul), SoulClass::Protected, "{soul}");
        }
    }

    #[test]
    fn internal_operations_are_recognized() {
        let policy = NamespacePolicy::default();
        assert_eq!(policy.classify("kx8f2abc"), SoulClass::InternalGunOperation);
        assert_eq!(
            policy.classify("3f2b8c1e-4a5d-4f6e-9b7c-1d2e3f4a5b6c"),
            SoulClass::InternalGunOperation
        );
        assert_eq!(policy.classify("#/content/abc"), SoulClass::InternalGunOperation);
    }

    #[test]
    fn application_paths_are_user_writable() {
        let policy = NamespacePolicy::default();
        assert_eq!(policy.classify("app/posts/1"), SoulClass::UserWritable);
        assert_eq!(policy.classify("chat/room/msg"), SoulClass::UserWritable);
    }

    #[test]
    fn first_match_wins_and_reserved_are_appended() {
        let policy = NamespacePolicy::new(["app/public/", "app/"]);
        assert_eq!(policy.matching_prefix("app/public/x"), Some("app/public/"));
        assert_eq!(policy.matching_prefix("app/other"), Some("app/"));
        for reserved in RESERVED_PREFIXES {
            assert!(policy.prefixes().iter().any(|p| p == reserved));
        }
    }

    #[test]
    fn broader_prefix_covers_reserved() {
        // "u" already covers "usage/" and "uploads/"
        let policy = NamespacePolicy::new(["u", ""]);
        assert_eq!(
            policy.prefixes(),
            &["u".to_string(), "systemhash/".to_string()]
        );
    }

    #[test]
    fn api_keys_are_credentials_under_any_policy() {
        assert_eq!(
            NamespacePolicy::default().classify("apikeys/k1"),
            SoulClass::Credential
        );
        // A prefix covering the key store does not make it token-exempt
        let policy = NamespacePolicy::new(["a", "apikeys/"]);
        assert_eq!(policy.classify("apikeys/k1"), SoulClass::Credential);
        assert_eq!(policy.classify("app/x"), SoulClass::Protected);
    }

    #[test]
    fn class_exemptions() {
        assert!(!SoulClass::Credential.bypasses_write_check());
        assert!(!SoulClass::Credential.honors_internal_override());
        assert!(!SoulClass::Credential.is_sweepable());
        assert!(SoulClass::Protected.bypasses_write_check());
        assert!(!SoulClass::Protected.is_sweepable());
        assert!(SoulClass::InternalGunOperation.bypasses_write_check());
        assert!(SoulClass::InternalGunOperation.is_sweepable());
        assert!(!SoulClass::UserWritable.bypasses_write_check());
        assert!(SoulClass::UserWritable.honors_internal_override());
        assert!(SoulClass::UserWritable.is_sweepable());
    }
}
