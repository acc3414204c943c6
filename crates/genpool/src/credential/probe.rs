// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probe client for the opaque generation API.

use reqwest::Client;

/// Classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The API accepted the credential (any status other than 401/403).
    Valid,
    /// The API rejected the credential outright.
    Unauthorized,
    /// The API could not be reached; says nothing about the credential.
    Unreachable,
}

/// HTTP client wrapper for the generation API.
pub struct GenerationApiClient {
    base_url: String,
    client: Client,
}

impl GenerationApiClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Probe a credential with a minimal-cost request. The API gives no
    /// structured validity signal, so only an explicit auth rejection counts
    /// against the credential.
    pub async fn probe(&self, secret: &str) -> ProbeOutcome {
        let req = self
            .client
            .get(self.url("/api/v1/quota"))
            .bearer_auth(secret);
        match req.send().await {
            Ok(resp) => match resp.status().as_u16() {
                401 | 403 => ProbeOutcome::Unauthorized,
                _ => ProbeOutcome::Valid,
            },
            Err(e) => {
                tracing::debug!(err = %e, "generation api unreachable");
                ProbeOutcome::Unreachable
            }
        }
    }
}
