// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::PoolError;
use crate::state::SharedState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), PoolError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(PoolError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(PoolError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(PoolError::Unauthorized)
    }
}

/// Validate a token presented by a WebSocket client (`?token=...` query
/// parameter, already extracted).
pub fn validate_token(provided: Option<&str>, expected: Option<&str>) -> Result<(), PoolError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    match provided {
        Some(tok) if constant_time_eq(tok, expected) => Ok(()),
        _ => Err(PoolError::Unauthorized),
    }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/v1/health`, the public status poll, and WebSocket upgrades
/// (`/ws/`, authenticated via query param in the handler).
pub async fn auth_layer(
    state: State<SharedState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/api/v1/health" || path.starts_with("/status/") || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_passes_without_configured_token() {
        let headers = HeaderMap::new();
        assert!(validate_bearer(&headers, None).is_ok());
    }

    #[test]
    fn bearer_requires_exact_match() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sekrit".parse().expect("header"));
        assert!(validate_bearer(&headers, Some("sekrit")).is_ok());
        assert!(validate_bearer(&headers, Some("other")).is_err());
        assert!(validate_bearer(&HeaderMap::new(), Some("sekrit")).is_err());
    }

    #[test]
    fn ws_token_requires_exact_match() {
        assert!(validate_token(Some("sekrit"), Some("sekrit")).is_ok());
        assert!(validate_token(Some("wrong"), Some("sekrit")).is_err());
        assert!(validate_token(None, Some("sekrit")).is_err());
        assert!(validate_token(None, None).is_ok());
        assert!(validate_token(Some("anything"), None).is_ok());
    }
}
