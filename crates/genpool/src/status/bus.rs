// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status event bus — fans out generation updates to WS connections and
//! caches the latest update per generation for the polling fallback.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use super::GenerationUpdate;

pub struct StatusBus {
    event_tx: broadcast::Sender<GenerationUpdate>,
    latest: RwLock<HashMap<String, GenerationUpdate>>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { event_tx, latest: RwLock::new(HashMap::new()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationUpdate> {
        self.event_tx.subscribe()
    }

    /// Record and fan out an update. A single channel keeps per-generation
    /// publish order; dropped sends just mean nobody is listening.
    pub async fn publish(&self, update: GenerationUpdate) {
        self.latest.write().await.insert(update.generation_id.clone(), update.clone());
        let _ = self.event_tx.send(update);
    }

    /// Latest known update for a generation, if any was ever published.
    pub async fn latest(&self, generation_id: &str) -> Option<GenerationUpdate> {
        self.latest.read().await.get(generation_id).cloned()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
