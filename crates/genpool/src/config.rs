// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::credential::pool::ScoreWeights;

/// Configuration for the genpool service.
#[derive(Debug, Clone, clap::Args)]
pub struct PoolConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "GENPOOL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "GENPOOL_PORT")]
    pub port: u16,

    /// Bearer token for the pool API. If unset, auth is disabled.
    #[arg(long, env = "GENPOOL_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to the durable credential store. If unset, the pool is memory-only.
    #[arg(long, env = "GENPOOL_STORE")]
    pub store: Option<std::path::PathBuf>,

    /// Base URL of the generation API used for credential probes.
    #[arg(long, default_value = "https://ai.imgkits.com/suno", env = "GENPOOL_GENERATION_API")]
    pub generation_api_url: String,

    /// Ownership collaborator base URL. If unset, subscription ownership
    /// checks are disabled.
    #[arg(long, env = "GENPOOL_OWNERSHIP_URL")]
    pub ownership_url: Option<String>,

    /// Pool cache sync interval in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "GENPOOL_SYNC_MS")]
    pub sync_ms: u64,

    /// Health verification interval in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "GENPOOL_VERIFY_MS")]
    pub verify_ms: u64,

    /// Expiry sweep interval in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "GENPOOL_SWEEP_MS")]
    pub sweep_ms: u64,

    /// Consecutive unreachable probes before a credential is degraded.
    #[arg(long, default_value_t = 3, env = "GENPOOL_MAX_PROBE_FAILURES")]
    pub max_probe_failures: u32,

    /// Exclusive lock window granted by acquire, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "GENPOOL_LOCK_WINDOW_MS")]
    pub lock_window_ms: u64,

    /// WebSocket heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "GENPOOL_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Missed heartbeats before a connection is closed.
    #[arg(long, default_value_t = 5, env = "GENPOOL_HEARTBEAT_MISSED")]
    pub heartbeat_missed_limit: u32,

    /// Usage budget for free-tier credentials.
    #[arg(long, default_value_t = 5, env = "GENPOOL_FREE_MAX_USES")]
    pub free_max_uses: u64,

    /// Usage budget for premium and admin credentials.
    #[arg(long, default_value_t = 999_999, env = "GENPOOL_PAID_MAX_USES")]
    pub paid_max_uses: u64,

    /// Scoring: base score every usable credential starts from.
    #[arg(long, default_value_t = 100.0, env = "GENPOOL_SCORE_BASE")]
    pub score_base: f64,

    /// Scoring: bonus for admin-tier credentials.
    #[arg(long, default_value_t = 150.0, env = "GENPOOL_SCORE_TIER_ADMIN")]
    pub score_tier_admin: f64,

    /// Scoring: bonus for premium-tier credentials.
    #[arg(long, default_value_t = 100.0, env = "GENPOOL_SCORE_TIER_PREMIUM")]
    pub score_tier_premium: f64,

    /// Scoring: bonus for free-tier credentials.
    #[arg(long, default_value_t = 50.0, env = "GENPOOL_SCORE_TIER_FREE")]
    pub score_tier_free: f64,

    /// Scoring: penalty weight applied to the usage ratio.
    #[arg(long, default_value_t = 30.0, env = "GENPOOL_SCORE_USAGE_PENALTY")]
    pub score_usage_penalty: f64,

    /// Scoring: idle-time bonus cap in minutes.
    #[arg(long, default_value_t = 30.0, env = "GENPOOL_SCORE_IDLE_CAP_MIN")]
    pub score_idle_cap_min: f64,

    /// Scoring: penalty weight applied to the error rate.
    #[arg(long, default_value_t = 20.0, env = "GENPOOL_SCORE_ERROR_PENALTY")]
    pub score_error_penalty: f64,

    /// Scoring: flat penalty for degraded credentials.
    #[arg(long, default_value_t = 10.0, env = "GENPOOL_SCORE_DEGRADED_PENALTY")]
    pub score_degraded_penalty: f64,
}

impl PoolConfig {
    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sync_ms)
    }

    pub fn verify_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.verify_ms)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sweep_ms)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }

    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            base: self.score_base,
            tier_admin: self.score_tier_admin,
            tier_premium: self.score_tier_premium,
            tier_free: self.score_tier_free,
            usage_penalty: self.score_usage_penalty,
            idle_cap_min: self.score_idle_cap_min,
            error_penalty: self.score_error_penalty,
            degraded_penalty: self.score_degraded_penalty,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            auth_token: None,
            store: None,
            generation_api_url: "https://ai.imgkits.com/suno".into(),
            ownership_url: None,
            sync_ms: 60_000,
            verify_ms: 300_000,
            sweep_ms: 3_600_000,
            max_probe_failures: 3,
            lock_window_ms: 30_000,
            heartbeat_ms: 30_000,
            heartbeat_missed_limit: 5,
            free_max_uses: 5,
            paid_max_uses: 999_999,
            score_base: 100.0,
            score_tier_admin: 150.0,
            score_tier_premium: 100.0,
            score_tier_free: 50.0,
            score_usage_penalty: 30.0,
            score_idle_cap_min: 30.0,
            score_error_penalty: 20.0,
            score_degraded_penalty: 10.0,
        }
    }
}
