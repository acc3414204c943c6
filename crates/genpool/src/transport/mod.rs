// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the pool service.

pub mod auth;
pub mod http;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::SharedState;
use crate::status::ws;

/// Build the axum `Router` with all pool routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Credential ingestion and management
        .route("/api/v1/credentials", post(http::add_credential).get(http::list_credentials))
        .route("/api/v1/credentials/batch", post(http::add_credentials_batch))
        .route("/api/v1/credentials/{id}", delete(http::remove_credential))
        // Pool collaborator surface
        .route("/api/v1/pool/acquire", post(http::pool_acquire))
        .route("/api/v1/pool/release", post(http::pool_release))
        .route("/api/v1/pool/stats", get(http::pool_stats))
        // Pipeline publish
        .route("/api/v1/generations/{id}/progress", post(http::publish_progress))
        // Public polling fallback (no auth)
        .route("/status/{generation_id}", get(http::generation_status))
        // Status stream
        .route("/ws/status", get(ws::ws_status_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
