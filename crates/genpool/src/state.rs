// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::authz::OwnershipVerifier;
use crate::config::PoolConfig;
use crate::credential::pool::CredentialPool;
use crate::credential::store::CredentialStore;
use crate::status::bus::StatusBus;
use crate::status::registry::ConnectionRegistry;

/// Shared service state.
pub struct AppState {
    pub config: PoolConfig,
    pub store: Arc<CredentialStore>,
    pub pool: Arc<CredentialPool>,
    pub bus: Arc<StatusBus>,
    pub registry: Arc<ConnectionRegistry>,
    pub authz: Arc<dyn OwnershipVerifier>,
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<AppState>;

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
