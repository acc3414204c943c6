// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status WebSocket endpoint — per-connection subscribe/unsubscribe with
//! ownership checks, heartbeat supervision, and bus fan-out.

use std::ops::ControlFlow;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::state::{epoch_ms, SharedState};
use crate::status::registry::ConnectionEntry;
use crate::status::{ClientMessage, ServerMessage};
use crate::transport::auth;

/// Query parameters for the status WebSocket.
#[derive(Debug, Deserialize)]
pub struct StatusWsQuery {
    /// Auth token.
    pub token: Option<String>,
    /// Caller identity; ownership checks run against this per subscribe.
    pub identity: Option<String>,
}

/// `GET /ws/status` — WebSocket upgrade for the generation status stream.
pub async fn ws_status_handler(
    State(state): State<SharedState>,
    Query(query): Query<StatusWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_token(query.token.as_deref(), state.config.auth_token.as_deref()).is_err() {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    let identity = query.identity.unwrap_or_else(|| "anonymous".to_owned());
    ws.on_upgrade(move |socket| handle_status_connection(state, socket, identity))
        .into_response()
}

/// Per-connection event loop. A failure on this socket tears down only this
/// connection; the registry entry is always removed on the way out.
async fn handle_status_connection(state: SharedState, socket: WebSocket, identity: String) {
    let entry = state.registry.register(identity).await;
    let mut bus_rx = state.bus.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let greeting =
        ServerMessage::Connected { connection_id: entry.id.clone(), timestamp: epoch_ms() };
    if send(&mut ws_tx, &greeting).await.is_err() {
        state.registry.remove(&entry.id).await;
        return;
    }

    let heartbeat = state.config.heartbeat_interval();
    let heartbeat_ms = heartbeat.as_millis() as u64;
    let missed_limit = state.config.heartbeat_missed_limit;
    let mut ping = tokio::time::interval(heartbeat);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the first ping
    // goes out a full interval after connect.
    ping.tick().await;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = entry.cancel.cancelled() => break,
            _ = ping.tick() => {
                if is_stale(entry.last_pong_ms(), epoch_ms(), heartbeat_ms, missed_limit) {
                    tracing::info!(connection_id = %entry.id, "heartbeat timeout, closing connection");
                    break;
                }
                if send(&mut ws_tx, &ServerMessage::Ping { timestamp: epoch_ms() }).await.is_err() {
                    break;
                }
            }
            event = bus_rx.recv() => {
                let update = match event {
                    Ok(u) => u,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(connection_id = %entry.id, skipped = n, "slow ws consumer lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if entry.is_subscribed(&update.generation_id).await {
                    if send(&mut ws_tx, &ServerMessage::GenerationUpdate { update }).await.is_err() {
                        break;
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, &entry, &mut ws_tx, &text).await.is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.remove(&entry.id).await;
}

async fn handle_client_message(
    state: &SharedState,
    entry: &ConnectionEntry,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> ControlFlow<()> {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::debug!(connection_id = %entry.id, "ignoring malformed client message");
        return ControlFlow::Continue(());
    };

    match msg {
        ClientMessage::Subscribe { generation_id } => {
            if !state.authz.verify_ownership(&entry.identity, &generation_id).await {
                tracing::warn!(
                    connection_id = %entry.id,
                    identity = %entry.identity,
                    generation_id,
                    "unauthorized subscription attempt"
                );
                let denied = ServerMessage::Error {
                    code: "UNAUTHORIZED".into(),
                    message: "not the owner of this generation".into(),
                };
                let _ = send(ws_tx, &denied).await;
                return ControlFlow::Break(());
            }
            entry.subscribe(&generation_id).await;
            let ack = ServerMessage::Subscribed { generation_id: generation_id.clone() };
            if send(ws_tx, &ack).await.is_err() {
                return ControlFlow::Break(());
            }
            // Late subscribers catch up from the latest cached update.
            if let Some(update) = state.bus.latest(&generation_id).await {
                if send(ws_tx, &ServerMessage::GenerationUpdate { update }).await.is_err() {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        }
        ClientMessage::Unsubscribe { generation_id } => {
            entry.unsubscribe(&generation_id).await;
            let ack = ServerMessage::Unsubscribed { generation_id };
            if send(ws_tx, &ack).await.is_err() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        ClientMessage::Pong => {
            entry.touch();
            ControlFlow::Continue(())
        }
    }
}

async fn send(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    ws_tx.send(Message::Text(json.into())).await
}

/// A connection is stale once `missed_limit` heartbeat intervals pass with
/// no pong from the client.
fn is_stale(last_pong_ms: u64, now_ms: u64, heartbeat_ms: u64, missed_limit: u32) -> bool {
    now_ms.saturating_sub(last_pong_ms) > heartbeat_ms.saturating_mul(missed_limit as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_missed_heartbeats_mark_a_connection_stale() {
        let heartbeat_ms = 30_000;
        let limit = 5;
        // Four missed intervals: still within budget.
        assert!(!is_stale(0, 4 * heartbeat_ms, heartbeat_ms, limit));
        assert!(!is_stale(0, 5 * heartbeat_ms, heartbeat_ms, limit));
        // Past the fifth interval with no pong: stale.
        assert!(is_stale(0, 5 * heartbeat_ms + 1, heartbeat_ms, limit));
    }

    #[test]
    fn a_recent_pong_resets_the_budget() {
        let heartbeat_ms = 30_000;
        let now = 1_000_000;
        assert!(!is_stale(now - heartbeat_ms, now, heartbeat_ms, 5));
        assert!(is_stale(now - 6 * heartbeat_ms, now, heartbeat_ms, 5));
    }
}
