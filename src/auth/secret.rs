// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret digests and constant-time comparison.
//!
//! Raw secrets are never compared. Every credential is reduced to a SHA-256
//! digest and digests are compared with [`constant_time_eq`], whose running
//! time does not depend on where the first differing byte sits.
//!
//! Digests of presented tokens are memoized in a bounded LRU cache so that
//! peers replaying the same stamped token do not re-hash on every message.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AuthError;

/// Width every comparison is padded to.
pub const MAX_COMPARE_LEN: usize = 64;

/// Default number of presented-token digests kept in memory.
const DEFAULT_DIGEST_CACHE_CAPACITY: usize = 1024;

/// One-way digest of a secret.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    /// Hash a secret.
    pub fn of(secret: &str) -> Self {
        let hash = Sha256::digest(secret.as_bytes());
        Self(hash.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex encoding (used for persistence).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(encoded: &str) -> Option<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(encoded, &mut out).ok()?;
        Some(Self(out))
    }

    /// Constant-time equality with another digest.
    pub fn matches(&self, other: &SecretDigest) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretDigest(..)")
    }
}

/// Compare two byte strings in constant time.
///
/// Both sides are zero-padded to `max(MAX_COMPARE_LEN, a.len(), b.len())`
/// so unequal lengths still walk the full width; the length check itself is
/// folded in without branching.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let width = MAX_COMPARE_LEN.max(a.len()).max(b.len());

    let mut left = vec![0u8; width];
    let mut right = vec![0u8; width];
    left[..a.len()].copy_from_slice(a);
    right[..b.len()].copy_from_slice(b);

    let same_len = (a.len() as u64).ct_eq(&(b.len() as u64));
    let same_bytes = left.as_slice().ct_eq(right.as_slice());
    bool::from(same_len & same_bytes)
}

/// Holds the admin digest and a cache of presented-token digests.
pub struct SecretComparator {
    admin: Option<SecretDigest>,
    cache: Mutex<LruCache<String, SecretDigest>>,
}

impl SecretComparator {
    /// Build a comparator. The admin digest is computed once here.
    pub fn new(admin_secret: Option<&str>) -> Self {
        Self::with_capacity(admin_secret, DEFAULT_DIGEST_CACHE_CAPACITY)
    }

    pub fn with_capacity(admin_secret: Option<&str>, capacity: usize) -> Self {
        Self {
            admin: admin_secret
                .filter(|s| !s.is_empty())
                .map(SecretDigest::of),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Whether a reference secret is configured.
    pub fn is_configured(&self) -> bool {
        self.admin.is_some()
    }

    /// Digest of a presented token, memoized.
    pub fn digest(&self, presented: &str) -> SecretDigest {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(digest) = cache.get(presented) {
                return digest.clone();
            }
            let digest = SecretDigest::of(presented);
            cache.put(presented.to_string(), digest.clone());
            return digest;
        }
        SecretDigest::of(presented)
    }

    /// Check a presented token against the admin secret.
    ///
    /// # Errors
    /// `AuthError::NotConfigured` when no admin secret exists; callers must
    /// surface this as a configuration failure, not as a plain denial.
    pub fn verify_admin(&self, presented: &str) -> Result<bool, AuthError> {
        let admin = self.admin.as_ref().ok_or(AuthError::NotConfigured)?;
        Ok(admin.matches(&self.digest(presented)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_secret_same_digest() {
        let a = SecretDigest::of("hunter2");
        let b = SecretDigest::of("hunter2");
        assert!(a.matches(&b));
        assert!(!a.matches(&SecretDigest::of("hunter3")));
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc\0", b"abc"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));

        let long = vec![7u8; MAX_COMPARE_LEN * 2];
        assert!(constant_time_eq(&long, &long));
        let mut other = long.clone();
        other[MAX_COMPARE_LEN + 3] = 8;
        assert!(!constant_time_eq(&long, &other));
    }

    #[test]
    fn hex_roundtrip_and_rejects_garbage() {
        let digest = SecretDigest::of("key");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(SecretDigest::from_hex(&hex), Some(digest));
        assert_eq!(SecretDigest::from_hex("zz"), None);
        assert_eq!(SecretDigest::from_hex(&"g".repeat(64)), None);
        // Wrong length in either direction
        assert_eq!(SecretDigest::from_hex(&hex[..62]), None);
        assert_eq!(SecretDigest::from_hex(&format!("{hex}00")), None);
        // Uppercase input decodes to the same digest
        assert_eq!(
            SecretDigest::from_hex(&hex.to_uppercase()),
            Some(SecretDigest::of("key"))
        );
    }

    #[test]
    fn verify_admin_matches_only_configured_secret() {
        let comparator = SecretComparator::new(Some("admin-secret"));
        assert!(comparator.verify_admin("admin-secret").unwrap());
        assert!(!comparator.verify_admin("admin-secret ").unwrap());
        assert!(!comparator.verify_admin("").unwrap());
    }

    #[test]
    fn missing_secret_is_configuration_error() {
        let comparator = SecretComparator::new(None);
        assert!(!comparator.is_configured());
        assert!(matches!(
            comparator.verify_admin("anything"),
            Err(AuthError::NotConfigured)
        ));

        // Empty string counts as unset
        let comparator = SecretComparator::new(Some(""));
        assert!(!comparator.is_configured());
    }

    #[test]
    fn digest_cache_is_bounded() {
        let comparator = SecretComparator::with_capacity(Some("s"), 2);
        for i in 0..10 {
            comparator.digest(&format!("token-{i}"));
        }
        assert_eq!(comparator.cache.lock().unwrap().len(), 2);
        assert!(comparator.digest("token-9").matches(&SecretDigest::of("token-9")));
    }

    /// Statistical check that comparison time does not track the position of
    /// the first differing byte. Timing-sensitive, so run on demand only.
    #[test]
    #[ignore = "timing-sensitive; run with --ignored on a quiet machine"]
    fn compare_time_independent_of_mismatch_position() {
        use std::time::Instant;

        let reference = SecretDigest::of("reference");
        let mut first_byte = reference.as_bytes().to_vec();
        first_byte[0] ^= 0xff;
        let mut last_byte = reference.as_bytes().to_vec();
        last_byte[31] ^= 0xff;

        let rounds = 200_000;
        let time = |candidate: &[u8]| {
            let start = Instant::now();
            for _ in 0..rounds {
                std::hint::black_box(constant_time_eq(reference.as_bytes(), candidate));
            }
            start.elapsed().as_nanos() as f64
        };

        // Warm up, then interleave measurements
        time(&first_byte);
        let mut ratios = Vec::new();
        for _ in 0..5 {
            let a = time(&first_byte);
            let b = time(&last_byte);
            ratios.push(a / b);
        }
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = ratios[ratios.len() / 2];
        assert!((0.8..1.25).contains(&median), "median ratio {median}");
    }
}
