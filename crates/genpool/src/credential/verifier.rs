// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background credential health verification.
//!
//! Probes run against a snapshot of the pool so a slow generation API never
//! blocks `acquire`. An explicit auth rejection retires a credential
//! immediately; transport failures only degrade it after a streak, since an
//! unreachable API says nothing about the credential itself.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pool::CredentialPool;
use super::probe::{GenerationApiClient, ProbeOutcome};
use super::store::CredentialStore;
use super::HealthStatus;

pub fn spawn_health_verifier(
    pool: Arc<CredentialPool>,
    api: Arc<GenerationApiClient>,
    period: Duration,
    max_failures: u32,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => verify_pool(&pool, &api, max_failures).await,
            }
        }
    });
}

/// Probe every non-retired credential and record the outcomes.
pub async fn verify_pool(pool: &CredentialPool, api: &GenerationApiClient, max_failures: u32) {
    let entries = pool.active_entries().await;
    if entries.is_empty() {
        return;
    }
    tracing::debug!(count = entries.len(), "verifying credential health");
    for cred in entries {
        let outcome = api.probe(&cred.secret).await;
        apply_outcome(pool.store(), &cred.id, outcome, max_failures).await;
    }
    pool.sync().await;
}

async fn apply_outcome(
    store: &Arc<CredentialStore>,
    id: &Uuid,
    outcome: ProbeOutcome,
    max_failures: u32,
) {
    let result = match outcome {
        ProbeOutcome::Unauthorized => {
            tracing::warn!(id = %id, "credential rejected by generation api, retiring");
            store.update(id, |c| c.health = HealthStatus::Expired).await
        }
        ProbeOutcome::Unreachable => {
            store
                .update(id, |c| {
                    c.consecutive_failures += 1;
                    if c.consecutive_failures >= max_failures && c.health == HealthStatus::Healthy {
                        tracing::warn!(id = %c.id, failures = c.consecutive_failures, "credential degraded");
                        c.health = HealthStatus::Degraded;
                    }
                })
                .await
        }
        ProbeOutcome::Valid => {
            store
                .update(id, |c| {
                    c.consecutive_failures = 0;
                    if c.health == HealthStatus::Degraded {
                        tracing::info!(id = %c.id, "credential recovered");
                        c.health = HealthStatus::Healthy;
                    }
                })
                .await
        }
    };
    if let Err(e) = result {
        tracing::warn!(id = %id, err = %e, "failed to record probe outcome");
    }
}
