// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Mutation Gate
//!
//! Decides whether an incoming graph mutation may be applied and forwarded.
//!
//! ## Decision Order
//!
//! 1. Any `Credential` soul in the batch without a valid admin token → reject
//! 2. Protection disabled → accept
//! 3. Empty batch → accept (nothing is written)
//! 4. Soul is `Protected` or `InternalGunOperation` → accept without token
//! 5. Internal override raised for the current task → accept
//! 6. No admin secret configured → reject (configuration error)
//! 7. Presented token digest matches the admin digest → accept, else reject
//!
//! By default only the first soul of a batch is classified and the decision
//! applies to the whole batch. [`BatchPolicy::EachSoul`] gates every soul
//! and rejects the batch when any one of them is unauthorized. Step 1 looks
//! at every soul under both policies, and neither the internal override nor
//! disabled protection relaxes it.
//!
//! ## Outbound Stamping
//!
//! Messages relayed onward to peers carry the admin secret in both
//! `headers.token` and `headers.Authorization`, so peers running the same
//! gate accept what this node accepted.

pub mod message;
pub mod namespace;
pub mod relay;

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{AuthError, SecretComparator};

pub use message::{MessageHeaders, MutationMessage, SoulWrite};
pub use namespace::{NamespacePolicy, SoulClass};
pub use relay::{InboundOutcome, RelayHook};

tokio::task_local! {
    static INTERNAL_WRITE: bool;
}

/// How multi-soul batches are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Classify the first soul only; the decision covers the batch.
    #[default]
    FirstSoul,
    /// Gate every soul; any rejection rejects the batch.
    EachSoul,
}

impl FromStr for BatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first-soul" => Ok(BatchPolicy::FirstSoul),
            "each" | "each-soul" => Ok(BatchPolicy::EachSoul),
            other => Err(format!("unknown batch policy '{other}' (expected 'first' or 'each')")),
        }
    }
}

/// Why a mutation was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    ProtectionDisabled,
    EmptyBatch,
    Exempt(SoulClass),
    InternalOverride,
    ValidToken,
}

/// Why a mutation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    InvalidToken,
    /// No admin secret configured
    NotConfigured,
}

/// A refused batch and the soul it was refused on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection<'m> {
    pub soul: &'m str,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept(AcceptReason),
    Reject(RejectReason),
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept(_))
    }
}

/// Runtime switches of the gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateOptions {
    pub protection_disabled: bool,
    pub batch_policy: BatchPolicy,
}

/// Write-authorization gate in front of the graph store.
pub struct MutationGate {
    policy: NamespacePolicy,
    comparator: Arc<SecretComparator>,
    admin_secret: Option<String>,
    options: GateOptions,
}

impl MutationGate {
    pub fn new(
        policy: NamespacePolicy,
        comparator: Arc<SecretComparator>,
        admin_secret: Option<String>,
        options: GateOptions,
    ) -> Self {
        if !comparator.is_configured() && !options.protection_disabled {
            tracing::error!(
                "No admin secret configured: writes to user-writable souls will be refused"
            );
        }
        Self {
            policy,
            comparator,
            admin_secret: admin_secret.filter(|s| !s.is_empty()),
            options,
        }
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    pub fn options(&self) -> GateOptions {
        self.options
    }

    /// Run `fut` with the internal-write override raised.
    ///
    /// The override is scoped to the task polling `fut`; concurrent tasks
    /// (other peers' messages) never observe it.
    pub async fn internal_scope<F, T>(fut: F) -> T
    where
        F: Future<Output = T>,
    {
        INTERNAL_WRITE.scope(true, fut).await
    }

    /// Whether the current task runs inside [`MutationGate::internal_scope`].
    pub fn internal_override_raised() -> bool {
        INTERNAL_WRITE.try_with(|raised| *raised).unwrap_or(false)
    }

    /// Decide whether `message` may be applied.
    pub fn authorize(&self, message: &MutationMessage) -> GateDecision {
        match self.evaluate(message) {
            Ok(reason) => GateDecision::Accept(reason),
            Err(Rejection { soul, reason }) => {
                match reason {
                    RejectReason::NotConfigured => {
                        tracing::error!(soul, "Mutation refused: admin secret not configured")
                    }
                    _ => tracing::debug!(soul, ?reason, "Mutation rejected"),
                }
                GateDecision::Reject(reason)
            }
        }
    }

    /// Same decision as [`MutationGate::authorize`], naming the soul that
    /// caused a rejection. Nothing is logged.
    pub fn evaluate<'m>(
        &self,
        message: &'m MutationMessage,
    ) -> Result<AcceptReason, Rejection<'m>> {
        let token = message.presented_token();
        let check = |soul: &'m str, decision: GateDecision| match decision {
            GateDecision::Accept(reason) => Ok(reason),
            GateDecision::Reject(reason) => Err(Rejection { soul, reason }),
        };

        for soul in message.souls() {
            if self.policy.classify(soul) == SoulClass::Credential {
                check(soul, self.verify_token(token))?;
            }
        }

        if self.options.protection_disabled {
            return Ok(AcceptReason::ProtectionDisabled);
        }

        match self.options.batch_policy {
            BatchPolicy::FirstSoul => match message.first_soul() {
                Some(soul) => check(soul, self.authorize_soul(soul, token)),
                None => Ok(AcceptReason::EmptyBatch),
            },
            BatchPolicy::EachSoul => {
                let mut first = None;
                for soul in message.souls() {
                    let accepted = check(soul, self.authorize_soul(soul, token))?;
                    first.get_or_insert(accepted);
                }
                Ok(first.unwrap_or(AcceptReason::EmptyBatch))
            }
        }
    }

    fn authorize_soul(&self, soul: &str, token: Option<&str>) -> GateDecision {
        let class = self.policy.classify(soul);
        if class.bypasses_write_check() {
            return GateDecision::Accept(AcceptReason::Exempt(class));
        }
        if class.honors_internal_override() && Self::internal_override_raised() {
            return GateDecision::Accept(AcceptReason::InternalOverride);
        }
        self.verify_token(token)
    }

    fn verify_token(&self, token: Option<&str>) -> GateDecision {
        let Some(token) = token else {
            return if self.comparator.is_configured() {
                GateDecision::Reject(RejectReason::MissingToken)
            } else {
                GateDecision::Reject(RejectReason::NotConfigured)
            };
        };
        match self.comparator.verify_admin(token) {
            Ok(true) => GateDecision::Accept(AcceptReason::ValidToken),
            Ok(false) => GateDecision::Reject(RejectReason::InvalidToken),
            Err(AuthError::NotConfigured) => GateDecision::Reject(RejectReason::NotConfigured),
            Err(e) => {
                tracing::error!(error = %e, "Unexpected error verifying mutation token");
                GateDecision::Reject(RejectReason::InvalidToken)
            }
        }
    }

    /// Stamp the admin secret onto an outbound message.
    ///
    /// Returns `false` (message left untouched) when no secret is configured.
    pub fn stamp_outbound(&self, message: &mut MutationMessage) -> bool {
        let Some(secret) = &self.admin_secret else {
            return false;
        };
        let headers = message.headers.get_or_insert_with(MessageHeaders::default);
        headers.token = Some(secret.clone());
        headers.authorization = Some(format!("Bearer {secret}"));
        true
    }
}
