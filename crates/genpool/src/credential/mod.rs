// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential model: record struct, tier/health/source enums, and
//! material parsing for ingestion.
//!
//! A credential's durable fields live here; lock state is runtime-only and
//! belongs to the pool's lock map.

pub mod janitor;
pub mod pool;
pub mod probe;
pub mod store;
pub mod verifier;

use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner tier, ordered: higher tiers score higher during selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Admin,
}

/// Health classification assigned by verification and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Expired,
}

/// How the credential entered the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Manual,
    Automated,
    Imported,
}

/// A pooled credential. The durable store owns these records; the pool
/// cache holds mirrored copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    /// Opaque bearer material sent to the generation API. Unique across the pool.
    pub secret: String,
    /// Identity that contributed this credential, when known. Premium owners
    /// get first claim on their own credential during selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_identity: Option<String>,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub source: Source,
    /// Epoch seconds.
    pub issued_at: u64,
    /// Epoch seconds; `None` means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub usage_count: u64,
    pub max_uses: u64,
    #[serde(default)]
    pub health: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<u64>,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub failed_requests: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl Credential {
    /// Whether this credential can be handed out right now (lock state aside).
    ///
    /// A past `expires_at` counts as expired even before the janitor has
    /// durably recorded it.
    pub fn usable(&self, now_secs: u64) -> bool {
        if self.health == HealthStatus::Expired {
            return false;
        }
        if let Some(exp) = self.expires_at {
            if exp <= now_secs {
                return false;
            }
        }
        self.usage_count < self.max_uses
    }
}

/// Claims extracted from credential material during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialClaims {
    pub issuer: Option<String>,
    /// Epoch seconds.
    pub expires_at: Option<u64>,
}

/// Parse opaque credential material and extract issuer/expiry claims.
///
/// Material is a three-segment dot-separated token whose middle segment is
/// base64url-encoded JSON. Structure errors are ingestion failures; missing
/// `iss`/`exp` claims are not.
pub fn parse_material(material: &str) -> anyhow::Result<MaterialClaims> {
    let material = material.trim();
    if material.is_empty() {
        anyhow::bail!("empty credential material");
    }

    let segments: Vec<&str> = material.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        anyhow::bail!("expected three dot-separated segments");
    }

    let payload = decode_base64url(segments[1])
        .map_err(|e| anyhow::anyhow!("payload segment is not base64url: {e}"))?;
    let claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| anyhow::anyhow!("payload segment is not JSON: {e}"))?;
    if !claims.is_object() {
        anyhow::bail!("payload segment is not a JSON object");
    }

    Ok(MaterialClaims {
        issuer: claims.get("iss").and_then(|v| v.as_str()).map(String::from),
        expires_at: claims.get("exp").and_then(|v| v.as_u64()),
    })
}

/// Decode a base64url segment, tolerating both padded and unpadded forms.
fn decode_base64url(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}
