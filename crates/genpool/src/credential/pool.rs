// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory credential pool: scoring, exclusive locks, rotation.
//!
//! The pool mirrors the durable store into a cache refreshed on a sync
//! interval, so selection never waits on file IO. Lock state is runtime-only
//! and lives in a dedicated map; a crash simply drops all locks, which is
//! safe because lock windows are short.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, PoolError};
use crate::state::{epoch_ms, epoch_secs};

use super::store::CredentialStore;
use super::{parse_material, Credential, HealthStatus, Source, Tier};

/// Tunable weights for credential selection.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub base: f64,
    pub tier_admin: f64,
    pub tier_premium: f64,
    pub tier_free: f64,
    pub usage_penalty: f64,
    pub idle_cap_min: f64,
    pub error_penalty: f64,
    pub degraded_penalty: f64,
}

/// Score a usable credential for selection. Higher is better, floored at 0.
///
/// Tier dominates, then usage pressure, idle recovery time, observed error
/// rate, and a flat penalty while degraded.
pub fn score(cred: &Credential, w: &ScoreWeights, now_secs: u64) -> f64 {
    let mut score = w.base;
    score += match cred.tier {
        Tier::Admin => w.tier_admin,
        Tier::Premium => w.tier_premium,
        Tier::Free => w.tier_free,
    };
    let usage_ratio = if cred.max_uses > 0 {
        cred.usage_count as f64 / cred.max_uses as f64
    } else {
        1.0
    };
    score -= usage_ratio * w.usage_penalty;
    // Never-used credentials get the full idle bonus.
    let idle_min = match cred.last_used_at {
        Some(t) => now_secs.saturating_sub(t) as f64 / 60.0,
        None => w.idle_cap_min,
    };
    score += idle_min.min(w.idle_cap_min);
    if cred.total_requests > 0 {
        let error_rate = cred.failed_requests as f64 / cred.total_requests as f64;
        score -= error_rate * w.error_penalty;
    }
    if cred.health == HealthStatus::Degraded {
        score -= w.degraded_penalty;
    }
    score.max(0.0)
}

/// Per-tier usage budgets.
#[derive(Debug, Clone, Copy)]
pub struct UsageBudgets {
    pub free: u64,
    pub paid: u64,
}

impl UsageBudgets {
    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Free => self.free,
            Tier::Premium | Tier::Admin => self.paid,
        }
    }
}

/// Aggregate pool counters for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub expired: usize,
    pub locked: usize,
    pub available: usize,
    pub total_usage: u64,
}

/// Redacted credential view for the listing endpoint. Secret material never
/// leaves the pool through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialInfo {
    pub id: Uuid,
    pub tier: Tier,
    pub source: Source,
    pub health: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_identity: Option<String>,
    pub usage_count: u64,
    pub max_uses: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub locked: bool,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub added: usize,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
}

/// One credential to ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub material: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub owner_identity: Option<String>,
    #[serde(default)]
    pub tier: Tier,
}

pub struct CredentialPool {
    store: Arc<CredentialStore>,
    cache: RwLock<HashMap<Uuid, Credential>>,
    /// credential id -> lock expiry, epoch ms. Selection and locking happen
    /// under this mutex so a credential is never handed to two callers.
    locks: Mutex<HashMap<Uuid, u64>>,
    weights: ScoreWeights,
    budgets: UsageBudgets,
    lock_window_ms: u64,
}

impl CredentialPool {
    pub async fn new(
        store: Arc<CredentialStore>,
        weights: ScoreWeights,
        budgets: UsageBudgets,
        lock_window_ms: u64,
    ) -> Arc<Self> {
        let cache = store.snapshot().await;
        Arc::new(Self {
            store,
            cache: RwLock::new(cache),
            locks: Mutex::new(HashMap::new()),
            weights,
            budgets,
            lock_window_ms,
        })
    }

    /// Select the best usable credential, lock it, and bump its usage.
    ///
    /// Callers with a usable premium-or-better credential of their own get
    /// that credential back; everyone else draws from the shared pool by
    /// score. An empty candidate set fails fast with `PoolExhausted`.
    pub async fn acquire(&self, identity: Option<&str>) -> Result<Credential, ApiError> {
        let now_secs = epoch_secs();
        let now_ms = epoch_ms();

        let picked = {
            let cache = self.cache.read().await;
            let mut locks = self.locks.lock().await;
            locks.retain(|_, until| *until > now_ms);

            let candidates: Vec<&Credential> = cache
                .values()
                .filter(|c| c.usable(now_secs) && !locks.contains_key(&c.id))
                .collect();

            let own = identity.and_then(|ident| {
                candidates
                    .iter()
                    .filter(|c| {
                        c.owner_identity.as_deref() == Some(ident) && c.tier >= Tier::Premium
                    })
                    .min_by_key(|c| (c.issued_at, c.id))
                    .copied()
            });

            let best = own.or_else(|| {
                candidates.iter().copied().max_by(|a, b| {
                    score(a, &self.weights, now_secs)
                        .total_cmp(&score(b, &self.weights, now_secs))
                        // ties go to the earliest-issued credential
                        .then_with(|| b.issued_at.cmp(&a.issued_at))
                        .then_with(|| b.id.cmp(&a.id))
                })
            });

            let Some(best) = best else {
                return Err(ApiError::new(
                    PoolError::PoolExhausted,
                    "no usable credential available",
                ));
            };
            locks.insert(best.id, now_ms + self.lock_window_ms);
            best.id
        };

        // The lock above reserves the credential, so the usage bump can
        // happen outside the critical section.
        let bump = |c: &mut Credential| {
            c.usage_count += 1;
            c.total_requests += 1;
            c.last_used_at = Some(now_secs);
        };
        let updated = self.store.update(&picked, bump).await?;
        let Some(updated) = updated else {
            self.locks.lock().await.remove(&picked);
            return Err(ApiError::new(
                PoolError::Internal,
                "credential disappeared during acquire",
            ));
        };
        self.cache.write().await.insert(updated.id, updated.clone());
        tracing::debug!(id = %updated.id, tier = ?updated.tier, usage = updated.usage_count, "credential acquired");
        Ok(updated)
    }

    /// Release a lock after a successful use; clears the failure streak.
    pub async fn release_success(&self, id: &Uuid) -> Result<(), ApiError> {
        self.locks.lock().await.remove(id);
        let updated = self.store.update(id, |c| c.consecutive_failures = 0).await?;
        let Some(updated) = updated else {
            return Err(ApiError::new(PoolError::CredentialNotFound, "unknown credential"));
        };
        self.cache.write().await.insert(updated.id, updated);
        Ok(())
    }

    /// Release a lock after a failed use. A fatal failure retires the
    /// credential and hands back a replacement when one is available.
    pub async fn release_failure(
        &self,
        id: &Uuid,
        fatal: bool,
    ) -> Result<Option<Credential>, ApiError> {
        self.locks.lock().await.remove(id);
        let updated = self
            .store
            .update(id, |c| {
                c.failed_requests += 1;
                c.consecutive_failures += 1;
                if fatal {
                    c.health = HealthStatus::Expired;
                }
            })
            .await?;
        let Some(updated) = updated else {
            return Err(ApiError::new(PoolError::CredentialNotFound, "unknown credential"));
        };
        self.cache.write().await.insert(updated.id, updated);

        if !fatal {
            return Ok(None);
        }
        tracing::warn!(id = %id, "credential retired after fatal failure, rotating");
        match self.acquire(None).await {
            Ok(replacement) => Ok(Some(replacement)),
            Err(e) if e.kind() == PoolError::PoolExhausted => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parse, validate, and persist one credential; cache is updated
    /// immediately so the round trip add→acquire never waits for a sync tick.
    pub async fn add(
        &self,
        material: &str,
        source: Source,
        owner_identity: Option<String>,
        tier: Tier,
    ) -> Result<Credential, ApiError> {
        let claims = parse_material(material).map_err(|e| {
            ApiError::new(PoolError::InvalidCredentialFormat, e.to_string())
        })?;
        let cred = Credential {
            id: Uuid::new_v4(),
            secret: material.trim().to_string(),
            owner_identity,
            tier,
            issuer: claims.issuer,
            source,
            issued_at: epoch_secs(),
            expires_at: claims.expires_at,
            usage_count: 0,
            max_uses: self.budgets.for_tier(tier),
            health: HealthStatus::Healthy,
            last_used_at: None,
            total_requests: 0,
            failed_requests: 0,
            consecutive_failures: 0,
        };
        self.store
            .insert(cred.clone())
            .await
            .map_err(|e| ApiError::new(PoolError::BadRequest, e.to_string()))?;
        self.cache.write().await.insert(cred.id, cred.clone());
        tracing::info!(id = %cred.id, tier = ?cred.tier, source = ?cred.source, "credential added");
        Ok(cred)
    }

    /// Ingest a batch; failures are reported per index without aborting the
    /// rest of the batch.
    pub async fn add_batch(&self, items: &[IngestRequest]) -> BatchOutcome {
        let mut outcome = BatchOutcome { added: 0, failed: Vec::new() };
        for (index, item) in items.iter().enumerate() {
            match self
                .add(&item.material, item.source, item.owner_identity.clone(), item.tier)
                .await
            {
                Ok(_) => outcome.added += 1,
                Err(e) => outcome.failed.push(BatchFailure {
                    index,
                    error: e.message().to_string(),
                }),
            }
        }
        outcome
    }

    pub async fn remove(&self, id: &Uuid) -> Result<Credential, ApiError> {
        let removed = self.store.remove(id).await?;
        let Some(removed) = removed else {
            return Err(ApiError::new(PoolError::CredentialNotFound, "unknown credential"));
        };
        self.cache.write().await.remove(id);
        self.locks.lock().await.remove(id);
        tracing::info!(id = %id, "credential removed");
        Ok(removed)
    }

    /// Refresh the cache from the store and drop locks for vanished ids.
    pub async fn sync(&self) {
        let snapshot = self.store.snapshot().await;
        {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, _| snapshot.contains_key(id));
        }
        *self.cache.write().await = snapshot;
    }

    pub async fn stats(&self) -> PoolStats {
        let now_secs = epoch_secs();
        let now_ms = epoch_ms();
        let cache = self.cache.read().await;
        let locks = self.locks.lock().await;
        let locked_ids: Vec<&Uuid> =
            locks.iter().filter(|(_, until)| **until > now_ms).map(|(id, _)| id).collect();

        let mut stats = PoolStats {
            total: cache.len(),
            healthy: 0,
            degraded: 0,
            expired: 0,
            locked: locked_ids.len(),
            available: 0,
            total_usage: 0,
        };
        for cred in cache.values() {
            match cred.health {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Degraded => stats.degraded += 1,
                HealthStatus::Expired => stats.expired += 1,
            }
            stats.total_usage += cred.usage_count;
            if cred.usable(now_secs) && !locked_ids.contains(&&cred.id) {
                stats.available += 1;
            }
        }
        stats
    }

    /// Redacted listing for operators.
    pub async fn list(&self) -> Vec<CredentialInfo> {
        let now_ms = epoch_ms();
        let cache = self.cache.read().await;
        let locks = self.locks.lock().await;
        let mut out: Vec<CredentialInfo> = cache
            .values()
            .map(|c| CredentialInfo {
                id: c.id,
                tier: c.tier,
                source: c.source,
                health: c.health,
                owner_identity: c.owner_identity.clone(),
                usage_count: c.usage_count,
                max_uses: c.max_uses,
                expires_at: c.expires_at,
                locked: locks.get(&c.id).is_some_and(|until| *until > now_ms),
            })
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }

    /// Entries worth probing (everything not already retired).
    pub async fn active_entries(&self) -> Vec<Credential> {
        self.cache
            .read()
            .await
            .values()
            .filter(|c| c.health != HealthStatus::Expired)
            .cloned()
            .collect()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    #[cfg(test)]
    pub async fn locked_count(&self) -> usize {
        let now_ms = epoch_ms();
        self.locks.lock().await.values().filter(|until| **until > now_ms).count()
    }

    /// Spawn the periodic cache sync loop.
    pub fn spawn_sync(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => pool.sync().await,
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod pool_tests;
