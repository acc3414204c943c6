// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable credential store: a JSON file mirrored into memory.
//!
//! The store is the single source of truth for credential records. Every
//! mutation rewrites the file atomically (unique temp name, then rename) so
//! a crash mid-write never corrupts the previous snapshot. Without a
//! configured path the store is memory-only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Credential, HealthStatus};

#[derive(Serialize, Deserialize, Default)]
struct PersistedPool {
    #[serde(default)]
    credentials: Vec<Credential>,
}

pub struct CredentialStore {
    path: Option<PathBuf>,
    records: RwLock<HashMap<Uuid, Credential>>,
}

impl CredentialStore {
    /// Open the store, loading the file at `path` if it exists.
    pub fn open(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut records = HashMap::new();
        if let Some(p) = &path {
            if p.exists() {
                let raw = std::fs::read(p)?;
                let persisted: PersistedPool = serde_json::from_slice(&raw)?;
                for cred in persisted.credentials {
                    records.insert(cred.id, cred);
                }
                tracing::info!(count = records.len(), path = %p.display(), "loaded credential store");
            }
        }
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new credential. Secret material must be unique across the
    /// pool; a duplicate is rejected without touching the file.
    pub async fn insert(&self, cred: Credential) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if records.values().any(|c| c.secret == cred.secret) {
            anyhow::bail!("credential material already present in the pool");
        }
        records.insert(cred.id, cred);
        self.persist(&records)?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Option<Credential> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<Uuid, Credential> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Apply `f` to the credential with `id` and persist the result.
    /// Returns the updated record, or `None` if the id is unknown.
    pub async fn update<F>(&self, id: &Uuid, f: F) -> anyhow::Result<Option<Credential>>
    where
        F: FnOnce(&mut Credential),
    {
        let mut records = self.records.write().await;
        let Some(cred) = records.get_mut(id) else {
            return Ok(None);
        };
        f(cred);
        let updated = cred.clone();
        self.persist(&records)?;
        Ok(Some(updated))
    }

    pub async fn remove(&self, id: &Uuid) -> anyhow::Result<Option<Credential>> {
        let mut records = self.records.write().await;
        let removed = records.remove(id);
        if removed.is_some() {
            self.persist(&records)?;
        }
        Ok(removed)
    }

    /// Mark credentials whose expiry has passed as `Expired`. Returns how
    /// many records changed; calling again with the same `now` changes none.
    pub async fn expire_before(&self, now_secs: u64) -> anyhow::Result<usize> {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for cred in records.values_mut() {
            if cred.health != HealthStatus::Expired
                && cred.expires_at.is_some_and(|exp| exp <= now_secs)
            {
                cred.health = HealthStatus::Expired;
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist(&records)?;
        }
        Ok(changed)
    }

    fn persist(&self, records: &HashMap<Uuid, Credential>) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut credentials: Vec<Credential> = records.values().cloned().collect();
        credentials.sort_by_key(|c| (c.issued_at, c.id));
        let body = serde_json::to_vec_pretty(&PersistedPool { credentials })?;
        atomic_write(path, &body)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write to a process-unique temp file in the target directory, then rename
/// over the destination.
fn atomic_write(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), n));
    std::fs::write(&tmp, body)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
