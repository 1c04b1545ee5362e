// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory resident snapshot of the graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{merge_fields, Fields, GraphStore, Node, StoreResult};

#[derive(Default)]
pub struct InMemoryGraph {
    nodes: RwLock<HashMap<String, Fields>>,
    ready: AtomicBool,
}

impl InMemoryGraph {
    /// Create a ready, empty graph.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
        }
    }

    /// Create a graph that reports itself as still initializing.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn contains(&self, soul: &str) -> bool {
        self.nodes.read().await.contains_key(soul)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn get(&self, soul: &str) -> StoreResult<Option<Node>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .get(soul)
            .map(|fields| Node::new(soul, fields.clone())))
    }

    async fn put(&self, soul: &str, fields: Fields) -> StoreResult<()> {
        let mut nodes = self.nodes.write().await;
        let existing = nodes.entry(soul.to_string()).or_default();
        merge_fields(existing, fields);
        Ok(())
    }

    async fn delete(&self, soul: &str) -> StoreResult<()> {
        self.nodes.write().await.remove(soul);
        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<Vec<Node>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .map(|(soul, fields)| Node::new(soul.clone(), fields.clone()))
            .collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<Node>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .filter(|(soul, _)| soul.starts_with(prefix))
            .map(|(soul, fields)| Node::new(soul.clone(), fields.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn put_merges_and_delete_removes() {
        let graph = InMemoryGraph::new();
        graph.put("app/a", fields(&[("x", json!(1))])).await.unwrap();
        graph.put("app/a", fields(&[("y", json!(2))])).await.unwrap();

        let node = graph.get("app/a").await.unwrap().unwrap();
        assert_eq!(node.fields.len(), 2);

        graph.delete("app/a").await.unwrap();
        assert!(graph.get("app/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_prefix_filters() {
        let graph = InMemoryGraph::new();
        graph.put("usage/alice", Fields::new()).await.unwrap();
        graph.put("usage/bob", Fields::new()).await.unwrap();
        graph.put("app/post", Fields::new()).await.unwrap();

        let usage = graph.scan_prefix("usage/").await.unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(graph.snapshot().await.unwrap().len(), 3);
    }

    #[test]
    fn uninitialized_graph_is_not_ready() {
        let graph = InMemoryGraph::uninitialized();
        assert!(!graph.is_ready());
        graph.mark_ready();
        assert!(graph.is_ready());
    }
}
