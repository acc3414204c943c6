// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the pool HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use axum_test::TestServer;
use base64::Engine;
use tokio_util::sync::CancellationToken;

use genpool::authz::{AllowAll, OwnershipVerifier};
use genpool::config::PoolConfig;
use genpool::credential::pool::{CredentialPool, UsageBudgets};
use genpool::credential::store::CredentialStore;
use genpool::state::AppState;
use genpool::status::bus::StatusBus;
use genpool::status::registry::ConnectionRegistry;
use genpool::transport::build_router;

fn test_config() -> PoolConfig {
    PoolConfig::default()
}

async fn test_state(config: PoolConfig) -> Arc<AppState> {
    let authz: Arc<dyn OwnershipVerifier> = Arc::new(AllowAll);
    let store = Arc::new(CredentialStore::open(None).expect("store"));
    let pool = CredentialPool::new(
        Arc::clone(&store),
        config.weights(),
        UsageBudgets { free: config.free_max_uses, paid: config.paid_max_uses },
        config.lock_window_ms,
    )
    .await;
    Arc::new(AppState {
        config,
        store,
        pool,
        bus: Arc::new(StatusBus::new()),
        registry: Arc::new(ConnectionRegistry::new()),
        authz,
        shutdown: CancellationToken::new(),
    })
}

fn test_server(state: Arc<AppState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

/// Well-formed credential material with the given expiry claim.
fn material(tag: &str, exp: u64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let body = engine.encode(serde_json::json!({ "iss": tag, "exp": exp }).to_string());
    format!("{tag}.{body}.sig")
}

fn far_future() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + 86_400
}

#[tokio::test]
async fn health_reports_counts() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["credentials"], 0);
    assert_eq!(body["connections"], 0);
    Ok(())
}

#[tokio::test]
async fn add_credential_then_acquire() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let m = material("t1", far_future());
    let resp = server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": m, "tier": "premium" }))
        .await;
    resp.assert_status_ok();
    let added: serde_json::Value = resp.json();
    let id = added["id"].as_str().expect("id").to_owned();

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status_ok();
    let grant: serde_json::Value = resp.json();
    assert_eq!(grant["id"], id.as_str());
    assert_eq!(grant["secret"], m.as_str());
    assert_eq!(grant["tier"], "premium");
    Ok(())
}

#[tokio::test]
async fn add_rejects_malformed_material() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": "definitely-not-a-token" }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIAL_FORMAT");
    Ok(())
}

#[tokio::test]
async fn duplicate_material_is_rejected() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let m = material("dup", far_future());
    server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": m }))
        .await
        .assert_status_ok();
    let resp = server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": m }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn batch_reports_mixed_outcome() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server
        .post("/api/v1/credentials/batch")
        .json(&serde_json::json!({
            "credentials": [
                { "material": material("b1", far_future()) },
                { "material": "garbage" },
                { "material": material("b2", far_future()), "tier": "admin" },
            ]
        }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["added"], 2);
    assert_eq!(body["failed"][0]["index"], 1);
    Ok(())
}

#[tokio::test]
async fn acquire_on_empty_pool_returns_503() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "POOL_EXHAUSTED");
    Ok(())
}

#[tokio::test]
async fn acquire_locks_until_release() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": material("lock", far_future()) }))
        .await
        .assert_status_ok();

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status_ok();
    let grant: serde_json::Value = resp.json();

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let resp = server
        .post("/api/v1/pool/release")
        .json(&serde_json::json!({ "id": grant["id"], "success": true }))
        .await;
    resp.assert_status_ok();

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn fatal_release_returns_a_replacement() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    for tag in ["r1", "r2"] {
        server
            .post("/api/v1/credentials")
            .json(&serde_json::json!({ "material": material(tag, far_future()), "tier": "premium" }))
            .await
            .assert_status_ok();
    }

    let resp = server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await;
    resp.assert_status_ok();
    let grant: serde_json::Value = resp.json();

    let resp = server
        .post("/api/v1/pool/release")
        .json(&serde_json::json!({ "id": grant["id"], "success": false, "fatal": true }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let replacement = &body["replacement"];
    assert!(replacement.is_object(), "expected a replacement grant, got: {body}");
    assert_ne!(replacement["id"], grant["id"]);

    // The retired credential shows up as expired in the listing.
    let resp = server.get("/api/v1/credentials").await;
    resp.assert_status_ok();
    let list: Vec<serde_json::Value> = resp.json();
    let retired = list.iter().find(|c| c["id"] == grant["id"]).expect("listed");
    assert_eq!(retired["health"], "expired");
    Ok(())
}

#[tokio::test]
async fn listing_never_exposes_secret_material() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": material("redact", far_future()) }))
        .await
        .assert_status_ok();

    let resp = server.get("/api/v1/credentials").await;
    resp.assert_status_ok();
    let list: Vec<serde_json::Value> = resp.json();
    assert_eq!(list.len(), 1);
    assert!(list[0].get("secret").is_none());
    assert!(resp.text().find("redact.").is_none());
    Ok(())
}

#[tokio::test]
async fn stats_count_the_pool() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    for tag in ["s1", "s2"] {
        server
            .post("/api/v1/credentials")
            .json(&serde_json::json!({ "material": material(tag, far_future()) }))
            .await
            .assert_status_ok();
    }
    server.post("/api/v1/pool/acquire").json(&serde_json::json!({})).await.assert_status_ok();

    let resp = server.get("/api/v1/pool/stats").await;
    resp.assert_status_ok();
    let stats: serde_json::Value = resp.json();
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["healthy"], 2);
    assert_eq!(stats["locked"], 1);
    assert_eq!(stats["available"], 1);
    assert_eq!(stats["total_usage"], 1);
    Ok(())
}

#[tokio::test]
async fn delete_removes_credential() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": material("del", far_future()) }))
        .await;
    resp.assert_status_ok();
    let added: serde_json::Value = resp.json();
    let id = added["id"].as_str().expect("id").to_owned();

    server.delete(&format!("/api/v1/credentials/{id}")).await.assert_status_ok();
    let resp = server.delete(&format!("/api/v1/credentials/{id}")).await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn publish_then_poll_status() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server
        .post("/api/v1/generations/gen-42/progress")
        .json(&serde_json::json!({ "status": "processing", "progress": 55 }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["published"], true);
    assert_eq!(body["subscribers"], 0);

    let resp = server.get("/status/gen-42").await;
    resp.assert_status_ok();
    let status: serde_json::Value = resp.json();
    assert_eq!(status["status"], "processing");
    assert_eq!(status["progress"], 55);
    assert!(status.get("audioUrl").is_none());

    // A later publish overwrites the cached status.
    server
        .post("/api/v1/generations/gen-42/progress")
        .json(&serde_json::json!({
            "status": "complete",
            "progress": 100,
            "audioUrl": "https://cdn.example.com/gen-42.mp3"
        }))
        .await
        .assert_status_ok();

    let resp = server.get("/status/gen-42").await;
    resp.assert_status_ok();
    let status: serde_json::Value = resp.json();
    assert_eq!(status["status"], "complete");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["audioUrl"], "https://cdn.example.com/gen-42.mp3");
    Ok(())
}

#[tokio::test]
async fn poll_unknown_generation_returns_404() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server.get("/status/never-published").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "GENERATION_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn publish_rejects_out_of_range_progress() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let resp = server
        .post("/api/v1/generations/gen-1/progress")
        .json(&serde_json::json!({ "status": "processing", "progress": 101 }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn bearer_auth_gates_the_api_but_not_public_routes() -> anyhow::Result<()> {
    let mut config = test_config();
    config.auth_token = Some("sekrit".into());
    let state = test_state(config).await;
    let server = test_server(state);

    // Health and the polling fallback stay open.
    server.get("/api/v1/health").await.assert_status_ok();
    server.get("/status/gen-1").await.assert_status(axum::http::StatusCode::NOT_FOUND);

    // Everything else wants the token.
    let resp = server.get("/api/v1/credentials").await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let resp = server.get("/api/v1/credentials").authorization_bearer("sekrit").await;
    resp.assert_status_ok();

    let resp = server.get("/api/v1/credentials").authorization_bearer("wrong").await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn acquire_prefers_the_callers_own_premium_credential() -> anyhow::Result<()> {
    let state = test_state(test_config()).await;
    let server = test_server(state);

    let own = material("own", far_future());
    server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({
            "material": own,
            "tier": "premium",
            "owner_identity": "alice"
        }))
        .await
        .assert_status_ok();
    server
        .post("/api/v1/credentials")
        .json(&serde_json::json!({ "material": material("shared", far_future()), "tier": "admin" }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/pool/acquire")
        .json(&serde_json::json!({ "identity": "alice" }))
        .await;
    resp.assert_status_ok();
    let grant: serde_json::Value = resp.json();
    assert_eq!(grant["secret"], own.as_str());
    Ok(())
}
