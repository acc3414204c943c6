// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic expiry sweep over the durable store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::pool::CredentialPool;
use crate::state::epoch_secs;

pub fn spawn_janitor(pool: Arc<CredentialPool>, period: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    sweep(&pool).await;
                }
            }
        }
    });
}

/// Mark past-expiry credentials and refresh the cache. Safe to run any
/// number of times.
pub async fn sweep(pool: &CredentialPool) -> usize {
    match pool.store().expire_before(epoch_secs()).await {
        Ok(0) => 0,
        Ok(n) => {
            tracing::info!(count = n, "expired credentials swept");
            pool.sync().await;
            n
        }
        Err(e) => {
            tracing::warn!(err = %e, "expiry sweep failed");
            0
        }
    }
}
