// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of live WS connections and their subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::state::epoch_ms;

/// One live WS connection.
pub struct ConnectionEntry {
    pub id: String,
    pub identity: String,
    pub subscriptions: RwLock<HashSet<String>>,
    last_pong_ms: AtomicU64,
    pub cancel: CancellationToken,
}

impl ConnectionEntry {
    /// Record a pong from the client.
    pub fn touch(&self) {
        self.last_pong_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn last_pong_ms(&self) -> u64 {
        self.last_pong_ms.load(Ordering::Relaxed)
    }

    pub async fn subscribe(&self, generation_id: &str) {
        self.subscriptions.write().await.insert(generation_id.to_owned());
    }

    /// Idempotent; returns whether the subscription existed.
    pub async fn unsubscribe(&self, generation_id: &str) -> bool {
        self.subscriptions.write().await.remove(generation_id)
    }

    pub async fn is_subscribed(&self, generation_id: &str) -> bool {
        self.subscriptions.read().await.contains(generation_id)
    }
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, identity: String) -> Arc<ConnectionEntry> {
        let entry = Arc::new(ConnectionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            identity,
            subscriptions: RwLock::new(HashSet::new()),
            last_pong_ms: AtomicU64::new(epoch_ms()),
            cancel: CancellationToken::new(),
        });
        self.connections.write().await.insert(entry.id.clone(), Arc::clone(&entry));
        tracing::debug!(connection_id = %entry.id, identity = %entry.identity, "ws connection registered");
        entry
    }

    /// Remove a connection, cancelling its loop and releasing every
    /// subscription it held.
    pub async fn remove(&self, id: &str) -> Option<Arc<ConnectionEntry>> {
        let entry = self.connections.write().await.remove(id)?;
        entry.cancel.cancel();
        entry.subscriptions.write().await.clear();
        tracing::debug!(connection_id = %id, "ws connection removed");
        Some(entry)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// How many live connections are subscribed to a generation.
    pub async fn subscriber_count(&self, generation_id: &str) -> usize {
        let connections = self.connections.read().await;
        let mut count = 0;
        for entry in connections.values() {
            if entry.is_subscribed(generation_id).await {
                count += 1;
            }
        }
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
