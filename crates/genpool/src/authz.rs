// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ownership verification for generation subscriptions.

use reqwest::Client;

/// Decides whether an identity may watch a generation's status stream.
#[async_trait::async_trait]
pub trait OwnershipVerifier: Send + Sync {
    async fn verify_ownership(&self, identity: &str, generation_id: &str) -> bool;
}

/// Asks an ownership collaborator over HTTP. Anything short of an explicit
/// 2xx is a denial, including transport failures.
pub struct HttpOwnershipVerifier {
    base_url: String,
    client: Client,
}

impl HttpOwnershipVerifier {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { base_url, client }
    }
}

#[async_trait::async_trait]
impl OwnershipVerifier for HttpOwnershipVerifier {
    async fn verify_ownership(&self, identity: &str, generation_id: &str) -> bool {
        let url = format!(
            "{}/api/v1/generations/{}/owner",
            self.base_url.trim_end_matches('/'),
            generation_id
        );
        match self.client.get(&url).query(&[("identity", identity)]).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(generation_id, err = %e, "ownership check failed, denying");
                false
            }
        }
    }
}

/// Permissive verifier for deployments without an ownership collaborator.
pub struct AllowAll;

#[async_trait::async_trait]
impl OwnershipVerifier for AllowAll {
    async fn verify_ownership(&self, _identity: &str, _generation_id: &str) -> bool {
        true
    }
}

/// Static generation→owner table, for tests and closed deployments.
#[derive(Default)]
pub struct StaticOwnership {
    owners: std::collections::HashMap<String, String>,
}

impl StaticOwnership {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            owners: pairs.into_iter().map(|(g, o)| (g.into(), o.into())).collect(),
        }
    }
}

#[async_trait::async_trait]
impl OwnershipVerifier for StaticOwnership {
    async fn verify_ownership(&self, identity: &str, generation_id: &str) -> bool {
        self.owners.get(generation_id).is_some_and(|owner| owner == identity)
    }
}
