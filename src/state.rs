// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{ApiKeyError, ApiKeyRegistry, SecretComparator};
use crate::config::RelayConfig;
use crate::gate::{GateOptions, MutationGate, NamespacePolicy, RelayHook};
use crate::graph::GraphStore;
use crate::ledger::{
    Reconciler, StorageAccounting, SystemHashIndex, UploadCatalog, UsageLedger,
};
use crate::sweeper::RetentionSweeper;

/// Shared handles for request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub store: Arc<dyn GraphStore>,
    pub comparator: Arc<SecretComparator>,
    pub gate: Arc<MutationGate>,
    pub relay: Arc<RelayHook>,
    pub ledger: Arc<UsageLedger>,
    pub hash_index: SystemHashIndex,
    pub catalog: Arc<UploadCatalog>,
    pub accounting: Arc<StorageAccounting>,
    pub sweeper: Arc<RetentionSweeper>,
    pub reconciler: Arc<Reconciler>,
    /// `None` when API keys are disabled
    pub api_keys: Option<Arc<ApiKeyRegistry>>,
    shutdown: CancellationToken,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    /// Build every component over `store`. Persisted API keys are loaded here.
    pub async fn init(config: RelayConfig, store: Arc<dyn GraphStore>) -> Result<Self, ApiKeyError> {
        let comparator = Arc::new(SecretComparator::new(config.admin_secret.as_deref()));
        let namespaces = NamespacePolicy::new(config.protected_namespaces.iter().cloned());

        let gate = Arc::new(MutationGate::new(
            namespaces.clone(),
            comparator.clone(),
            config.admin_secret.clone(),
            GateOptions {
                protection_disabled: config.protection_disabled,
                batch_policy: config.batch_policy,
            },
        ));
        let relay = Arc::new(RelayHook::new(gate.clone(), store.clone()));

        let ledger = Arc::new(UsageLedger::new(
            store.clone(),
            config.read_timeout,
            config.ledger_write_mode,
        ));
        let hash_index = SystemHashIndex::new(store.clone(), config.read_timeout);
        let catalog = Arc::new(UploadCatalog::new(store.clone(), config.read_timeout));
        let accounting = Arc::new(StorageAccounting::new(
            catalog.clone(),
            ledger.clone(),
            hash_index.clone(),
        ));

        let sweeper = Arc::new(RetentionSweeper::new(store.clone(), namespaces, config.gc));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            catalog.clone(),
            ledger.clone(),
            hash_index.clone(),
            config.reconcile,
        ));

        let api_keys = if config.api_keys_enabled {
            let registry = ApiKeyRegistry::new(store.clone());
            let loaded = registry.load().await?;
            tracing::info!(loaded, "API keys loaded");
            Some(Arc::new(registry))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            comparator,
            gate,
            relay,
            ledger,
            hash_index,
            catalog,
            accounting,
            sweeper,
            reconciler,
            api_keys,
            shutdown: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Spawn the sweeper and reconciler loops.
    pub fn start_background(&self) {
        let handles = [
            tokio::spawn(self.sweeper.clone().run(self.shutdown.clone())),
            tokio::spawn(self.reconciler.clone().run(self.shutdown.clone())),
        ];
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state with default config and the given admin secret.
    pub async fn for_tests(admin_secret: Option<&str>) -> Self {
        let config = RelayConfig {
            admin_secret: admin_secret.map(str::to_string),
            ..RelayConfig::default()
        };
        Self::init(config, Arc::new(crate::graph::InMemoryGraph::new()))
            .await
            .expect("in-memory state builds")
    }
}
