// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use graph_relay_gate::{
    api::router,
    config::RelayConfig,
    graph::{GraphStore, InMemoryGraph, RedbGraph},
    logging::init_tracing,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::from_env()?;
    init_tracing(config.log_format);

    let store: Arc<dyn GraphStore> = match &config.graph_db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Opening persistent graph store");
            Arc::new(RedbGraph::open(path)?)
        }
        None => {
            tracing::warn!("GRAPH_DB_PATH not set; graph data is kept in memory only");
            Arc::new(InMemoryGraph::new())
        }
    };

    let bind_addr = config.bind_addr;
    let state = AppState::init(config, store).await?;
    state.start_background();

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Graph relay gate listening (docs at /docs)");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
