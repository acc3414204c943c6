// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Genpool: credential pool manager and generation status relay.

pub mod authz;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod state;
pub mod status;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::authz::{AllowAll, HttpOwnershipVerifier, OwnershipVerifier};
use crate::config::PoolConfig;
use crate::credential::janitor::spawn_janitor;
use crate::credential::pool::{CredentialPool, UsageBudgets};
use crate::credential::probe::GenerationApiClient;
use crate::credential::store::CredentialStore;
use crate::credential::verifier::spawn_health_verifier;
use crate::state::AppState;
use crate::status::bus::StatusBus;
use crate::status::registry::ConnectionRegistry;
use crate::transport::build_router;

/// Run the pool server until shutdown.
pub async fn run(config: PoolConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = Arc::new(CredentialStore::open(config.store.clone())?);
    let pool = CredentialPool::new(
        Arc::clone(&store),
        config.weights(),
        UsageBudgets { free: config.free_max_uses, paid: config.paid_max_uses },
        config.lock_window_ms,
    )
    .await;
    let api = Arc::new(GenerationApiClient::new(config.generation_api_url.clone()));

    let authz: Arc<dyn OwnershipVerifier> = match &config.ownership_url {
        Some(url) => Arc::new(HttpOwnershipVerifier::new(url.clone())),
        None => {
            tracing::warn!("no ownership collaborator configured, subscriptions are unrestricted");
            Arc::new(AllowAll)
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        pool: Arc::clone(&pool),
        bus: Arc::new(StatusBus::new()),
        registry: Arc::new(ConnectionRegistry::new()),
        authz,
        shutdown: shutdown.clone(),
    });

    pool.spawn_sync(config.sync_interval(), shutdown.clone());
    spawn_health_verifier(
        Arc::clone(&pool),
        api,
        config.verify_interval(),
        config.max_probe_failures,
        shutdown.clone(),
    );
    spawn_janitor(Arc::clone(&pool), config.sweep_interval(), shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    tracing::info!("genpool listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
