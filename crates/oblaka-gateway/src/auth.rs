//! Bearer token check for privileged endpoints (`/debug`)

use axum::http::HeaderMap;
use tracing::warn;

/// Validate a bearer token against the configured token.
///
/// Returns `true` if:
/// - No token is configured (auth disabled)
/// - The provided token matches the configured token
pub fn validate_token(configured_token: &str, provided_token: &str) -> bool {
    if configured_token.is_empty() {
        return true;
    }
    if provided_token.is_empty() {
        warn!("Debug endpoint: no token provided");
        return false;
    }
    constant_time_eq(configured_token.as_bytes(), provided_token.as_bytes())
}

/// Extract bearer token from an Authorization header value.
///
/// Expects format: `Bearer <token>`
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Check the `Authorization` header of a request against `configured_token`
pub fn check_auth(configured_token: &str, headers: &HeaderMap) -> bool {
    if configured_token.is_empty() {
        return true;
    }
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .unwrap_or_default();
    validate_token(configured_token, token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
