//! Caller identity resolution.
//!
//! The host runtime authenticates callers out-of-band; what reaches this
//! service is an opaque bearer token. We never store tokens; the sha-256
//! fingerprint of the token is the canonical identity, which is what the
//! kernel's allow-lists and profile map are keyed by. A worker discovers
//! its own identity via `/whoami` and registers it once with an admin.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use skillgrid_core::Identity;

/// Sha-256 hex fingerprint of a presented token.
pub(crate) fn fingerprint(token: &str) -> Identity {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    Identity::new(hex::encode(hasher.finalize()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated caller, or `None` for anonymous requests.
pub(crate) fn caller(headers: &HeaderMap) -> Option<Identity> {
    bearer_token(headers).map(fingerprint)
}

/// Identity of the deploy-time bootstrap admin token, if configured.
pub(crate) fn bootstrap_admin_from_env() -> Option<Identity> {
    let token = std::env::var("SKILLGRID_ADMIN_TOKEN").ok()?;
    let token = token.trim().to_string();
    (!token.is_empty()).then(|| fingerprint(&token))
}
