// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transport hook between peers and the graph store.
//!
//! Inbound messages are gated, applied, then re-broadcast to peer
//! connections with the admin token stamped in. Rejected messages are
//! dropped without a reply: the wire protocol has no reject acknowledgment.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::{GateDecision, MutationGate, MutationMessage, RejectReason, SoulWrite};
use crate::graph::GraphStore;

/// Capacity of the outbound peer fan-out channel.
const PEER_CHANNEL_CAPACITY: usize = 256;

/// Result of handing a message to the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Gate accepted; `applied` writes landed, `failed` did not.
    Applied { applied: usize, failed: usize },
    /// Gate rejected; nothing was written or forwarded.
    Dropped(RejectReason),
}

pub struct RelayHook {
    gate: Arc<MutationGate>,
    store: Arc<dyn GraphStore>,
    peers: broadcast::Sender<MutationMessage>,
}

impl RelayHook {
    pub fn new(gate: Arc<MutationGate>, store: Arc<dyn GraphStore>) -> Self {
        let (peers, _) = broadcast::channel(PEER_CHANNEL_CAPACITY);
        Self { gate, store, peers }
    }

    pub fn gate(&self) -> &MutationGate {
        &self.gate
    }

    /// Outbound messages for one peer connection.
    pub fn subscribe(&self) -> broadcast::Receiver<MutationMessage> {
        self.peers.subscribe()
    }

    /// Gate, apply and forward one inbound message.
    pub async fn on_inbound(&self, message: MutationMessage) -> InboundOutcome {
        if let GateDecision::Reject(reason) = self.gate.authorize(&message) {
            return InboundOutcome::Dropped(reason);
        }

        let mut applied = 0;
        let mut failed = 0;
        for (soul, write) in message.writes() {
            let result = match write {
                SoulWrite::Merge(fields) => self.store.put(&soul, fields).await,
                SoulWrite::Delete => self.store.delete(&soul).await,
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(soul = %soul, error = %e, "Failed to apply accepted write");
                }
            }
        }

        self.forward(message);
        InboundOutcome::Applied { applied, failed }
    }

    /// Stamp and broadcast a message to connected peers.
    pub fn forward(&self, mut message: MutationMessage) {
        if !self.gate.stamp_outbound(&mut message) {
            tracing::warn!("Forwarding unstamped mutation: no admin secret configured");
        }
        // No subscribers means no peers connected
        let _ = self.peers.send(message);
    }
}
