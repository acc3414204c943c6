// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the pool API.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::pool::{BatchOutcome, CredentialInfo, IngestRequest, PoolStats};
use crate::credential::{Credential, Tier};
use crate::error::{ApiError, PoolError};
use crate::state::{epoch_ms, SharedState};
use crate::status::{GenerationStatus, GenerationUpdate};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub credentials: usize,
    pub connections: usize,
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_owned(),
        credentials: state.store.len().await,
        connections: state.registry.connection_count().await,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddCredentialResponse {
    pub id: Uuid,
}

/// `POST /api/v1/credentials`
pub async fn add_credential(
    State(state): State<SharedState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<AddCredentialResponse>, ApiError> {
    let cred = state
        .pool
        .add(&req.material, req.source, req.owner_identity, req.tier)
        .await?;
    Ok(Json(AddCredentialResponse { id: cred.id }))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub credentials: Vec<IngestRequest>,
}

/// `POST /api/v1/credentials/batch`
pub async fn add_credentials_batch(
    State(state): State<SharedState>,
    Json(req): Json<BatchRequest>,
) -> Json<BatchOutcome> {
    Json(state.pool.add_batch(&req.credentials).await)
}

/// `GET /api/v1/credentials` — redacted listing.
pub async fn list_credentials(State(state): State<SharedState>) -> Json<Vec<CredentialInfo>> {
    Json(state.pool.list().await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub removed: Uuid,
}

/// `DELETE /api/v1/credentials/{id}`
pub async fn remove_credential(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RemovedResponse>, ApiError> {
    state.pool.remove(&id).await?;
    Ok(Json(RemovedResponse { removed: id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct AcquireRequest {
    #[serde(default)]
    pub identity: Option<String>,
}

/// What a pool collaborator gets back from acquire. The only surface that
/// exposes secret material.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialGrant {
    pub id: Uuid,
    pub secret: String,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl From<Credential> for CredentialGrant {
    fn from(c: Credential) -> Self {
        Self { id: c.id, secret: c.secret, tier: c.tier, expires_at: c.expires_at }
    }
}

/// `POST /api/v1/pool/acquire`
pub async fn pool_acquire(
    State(state): State<SharedState>,
    Json(req): Json<AcquireRequest>,
) -> Result<Json<CredentialGrant>, ApiError> {
    let cred = state.pool.acquire(req.identity.as_deref()).await?;
    Ok(Json(cred.into()))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub id: Uuid,
    pub success: bool,
    /// A fatal failure retires the credential and rotates in a replacement.
    #[serde(default)]
    pub fatal: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<CredentialGrant>,
}

/// `POST /api/v1/pool/release`
pub async fn pool_release(
    State(state): State<SharedState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let replacement = if req.success {
        state.pool.release_success(&req.id).await?;
        None
    } else {
        state.pool.release_failure(&req.id, req.fatal).await?
    };
    Ok(Json(ReleaseResponse {
        released: req.id,
        replacement: replacement.map(CredentialGrant::from),
    }))
}

/// `GET /api/v1/pool/stats`
pub async fn pool_stats(State(state): State<SharedState>) -> Json<PoolStats> {
    Json(state.pool.stats().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub status: GenerationStatus,
    pub progress: u8,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub published: bool,
    pub subscribers: usize,
}

/// `POST /api/v1/generations/{id}/progress` — pipeline publish.
pub async fn publish_progress(
    State(state): State<SharedState>,
    Path(generation_id): Path<String>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    if req.progress > 100 {
        return Err(ApiError::new(PoolError::BadRequest, "progress must be 0..=100"));
    }
    let update = GenerationUpdate {
        generation_id: generation_id.clone(),
        status: req.status,
        progress: req.progress,
        audio_url: req.audio_url,
        message: req.message,
        timestamp: epoch_ms(),
    };
    state.bus.publish(update).await;
    Ok(Json(PublishResponse {
        published: true,
        subscribers: state.registry.subscriber_count(&generation_id).await,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: GenerationStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// `GET /status/{generation_id}` — public polling fallback.
pub async fn generation_status(
    State(state): State<SharedState>,
    Path(generation_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(update) = state.bus.latest(&generation_id).await else {
        return Err(ApiError::new(PoolError::GenerationNotFound, "unknown generation"));
    };
    Ok(Json(StatusResponse {
        status: update.status,
        progress: update.progress,
        audio_url: update.audio_url,
    }))
}
