// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Store doubles with injectable latency and failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Fields, GraphStore, InMemoryGraph, Node, StoreError, StoreResult};

#[derive(Default)]
pub struct FaultyGraph {
    pub inner: InMemoryGraph,
    read_delay: Option<Duration>,
    hang_reads: bool,
    fail_writes: AtomicBool,
    fail_souls: Mutex<HashSet<String>>,
}

impl FaultyGraph {
    pub fn new() -> Self {
        Self {
            inner: InMemoryGraph::new(),
            ..Default::default()
        }
    }

    /// Every read sleeps before answering.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Reads never resolve.
    pub fn with_hanging_reads(mut self) -> Self {
        self.hang_reads = true;
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes and deletes of `soul` fail.
    pub fn fail_soul(&self, soul: &str) {
        self.fail_souls.lock().unwrap().insert(soul.to_string());
    }

    async fn before_read(&self) {
        if self.hang_reads {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_write(&self, soul: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) || self.fail_souls.lock().unwrap().contains(soul)
        {
            return Err(StoreError::NotReady);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FaultyGraph {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    async fn get(&self, soul: &str) -> StoreResult<Option<Node>> {
        self.before_read().await;
        self.inner.get(soul).await
    }

    async fn put(&self, soul: &str, fields: Fields) -> StoreResult<()> {
        self.check_write(soul)?;
        self.inner.put(soul, fields).await
    }

    async fn delete(&self, soul: &str) -> StoreResult<()> {
        self.check_write(soul)?;
        self.inner.delete(soul).await
    }

    async fn snapshot(&self) -> StoreResult<Vec<Node>> {
        self.before_read().await;
        self.inner.snapshot().await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<Node>> {
        self.before_read().await;
        self.inner.scan_prefix(prefix).await
    }
}
