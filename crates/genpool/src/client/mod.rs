// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer-side status client.
//!
//! Runs two cooperating tasks per subscription: a WS channel task that
//! reconnects with exponential backoff, and a polling task that covers the
//! gaps whenever the channel is down. Both stop immediately on close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::state::epoch_ms;
use crate::status::{ClientMessage, GenerationUpdate, ServerMessage};
use crate::transport::http::StatusResponse;

#[derive(Debug, Clone)]
pub struct StatusClientConfig {
    /// HTTP base URL of the pool service.
    pub base_url: String,
    pub token: Option<String>,
    pub identity: Option<String>,
    /// Reconnect attempts before the channel task gives up for good.
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub poll_interval: Duration,
}

impl StatusClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            identity: None,
            max_reconnect_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct StatusClient {
    config: StatusClientConfig,
    http: Client,
}

/// A live subscription. Dropping it (or calling `close`) cancels both the
/// channel task and the polling task.
pub struct StatusSubscription {
    pub updates: mpsc::Receiver<GenerationUpdate>,
    cancel: CancellationToken,
}

impl StatusSubscription {
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StatusClient {
    pub fn new(config: StatusClientConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// Subscribe to one generation's status stream.
    pub fn subscribe(&self, generation_id: &str) -> StatusSubscription {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(channel_task(
            self.config.clone(),
            generation_id.to_owned(),
            tx.clone(),
            cancel.clone(),
            Arc::clone(&connected),
        ));
        tokio::spawn(poll_task(
            self.http.clone(),
            self.config.clone(),
            generation_id.to_owned(),
            tx,
            cancel.clone(),
            connected,
        ));

        StatusSubscription { updates: rx, cancel }
    }
}

/// Delay before reconnect attempt number `attempt` (0-based).
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let shifted = base_ms.saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(shifted.min(max.as_millis() as u64))
}

fn build_ws_url(config: &StatusClientConfig) -> String {
    let ws_base = if config.base_url.starts_with("https://") {
        config.base_url.replacen("https://", "wss://", 1)
    } else {
        config.base_url.replacen("http://", "ws://", 1)
    };

    let mut url = format!("{}/ws/status", ws_base.trim_end_matches('/'));
    let mut sep = '?';
    if let Some(token) = &config.token {
        url.push_str(&format!("{sep}token={token}"));
        sep = '&';
    }
    if let Some(identity) = &config.identity {
        url.push_str(&format!("{sep}identity={identity}"));
    }
    url
}

async fn channel_task(
    config: StatusClientConfig,
    generation_id: String,
    tx: mpsc::Sender<GenerationUpdate>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let url = build_ws_url(&config);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                attempt = 0; // reset on successful connect
                connected.store(true, Ordering::SeqCst);
                tracing::debug!(generation_id, "status WS connected");

                let (mut write, mut read) = ws_stream.split();
                let subscribe = ClientMessage::Subscribe { generation_id: generation_id.clone() };
                let subscribed = match serde_json::to_string(&subscribe) {
                    Ok(json) => write.send(Message::Text(json.into())).await.is_ok(),
                    Err(_) => false,
                };

                if subscribed {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        match serde_json::from_str::<ServerMessage>(&text) {
                                            Ok(ServerMessage::GenerationUpdate { update })
                                                if update.generation_id == generation_id =>
                                            {
                                                if tx.send(update).await.is_err() {
                                                    // consumer is gone
                                                    cancel.cancel();
                                                    break;
                                                }
                                            }
                                            Ok(ServerMessage::Ping { .. }) => {
                                                let pong = serde_json::to_string(&ClientMessage::Pong)
                                                    .unwrap_or_default();
                                                if write.send(Message::Text(pong.into())).await.is_err() {
                                                    break;
                                                }
                                            }
                                            Ok(ServerMessage::Error { code, message }) => {
                                                tracing::warn!(generation_id, code, message, "status WS error");
                                            }
                                            Ok(_) => {}
                                            Err(e) => {
                                                tracing::debug!(err = %e, "unparseable status WS message");
                                            }
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        tracing::debug!(generation_id, "status WS closed");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        tracing::debug!(generation_id, err = %e, "status WS error");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                connected.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::debug!(generation_id, err = %e, attempt, "status WS connect failed");
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        if attempt >= config.max_reconnect_attempts {
            tracing::warn!(generation_id, "giving up on status WS, polling only");
            break;
        }
        let delay = backoff_delay(attempt, config.base_delay, config.max_delay);
        attempt += 1;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn poll_task(
    http: Client,
    config: StatusClientConfig,
    generation_id: String,
    tx: mpsc::Sender<GenerationUpdate>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let mut tick = tokio::time::interval(config.poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                if connected.load(Ordering::SeqCst) {
                    continue;
                }
                match fetch_status(&http, &config.base_url, &generation_id).await {
                    Ok(update) => {
                        if tx.send(update).await.is_err() {
                            cancel.cancel();
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(generation_id, err = %e, "status poll failed");
                    }
                }
            }
        }
    }
}

async fn fetch_status(
    http: &Client,
    base_url: &str,
    generation_id: &str,
) -> anyhow::Result<GenerationUpdate> {
    let url = format!("{}/status/{}", base_url.trim_end_matches('/'), generation_id);
    let resp = http.get(&url).send().await?.error_for_status()?;
    let body: StatusResponse = resp.json().await?;
    Ok(GenerationUpdate {
        generation_id: generation_id.to_owned(),
        status: body.status,
        progress: body.progress,
        audio_url: body.audio_url,
        message: None,
        timestamp: epoch_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_nondecreasing_and_bounded() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        let mut prev = Duration::ZERO;
        for attempt in 0..40 {
            let d = backoff_delay(attempt, base, max);
            assert!(d >= prev, "attempt {attempt} went backwards");
            assert!(d <= max, "attempt {attempt} exceeded the cap");
            prev = d;
        }
        assert_eq!(backoff_delay(0, base, max), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(5, base, max), Duration::from_secs(30));
    }

    #[test]
    fn ws_url_carries_token_and_identity() {
        let mut config = StatusClientConfig::new("http://127.0.0.1:9700");
        assert_eq!(build_ws_url(&config), "ws://127.0.0.1:9700/ws/status");

        config.token = Some("sekrit".into());
        config.identity = Some("alice".into());
        assert_eq!(
            build_ws_url(&config),
            "ws://127.0.0.1:9700/ws/status?token=sekrit&identity=alice"
        );

        config.base_url = "https://pool.example.com".into();
        assert!(build_ws_url(&config).starts_with("wss://pool.example.com/ws/status"));
    }

    #[test]
    fn subscription_close_cancels_tasks() {
        let (_, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sub = StatusSubscription { updates: rx, cancel: cancel.clone() };
        sub.close();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn subscription_drop_cancels_tasks() {
        let (_, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        drop(StatusSubscription { updates: rx, cancel: cancel.clone() });
        assert!(cancel.is_cancelled());
    }
}
