//! Handshake authentication
//!
//! Token issuance lives outside this crate. A [`TokenVerifier`] turns the
//! bearer credential presented at handshake time into a [`Principal`], or
//! rejects it with [`ChatError::AuthRejected`].

use crate::core::error::{ChatError, ChatResult};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An authenticated identity owning zero or more sessions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier issued by the auth collaborator
    pub id: String,
    /// Display name used as the `sender` of every message this principal writes
    pub name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Trait for bearer credential verification
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to its principal
    async fn verify(&self, token: &str) -> ChatResult<Principal>;
}

/// Verifier backed by a fixed token table
///
/// Used for development and tests, and when tokens are provisioned through
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(tokens: HashMap<String, Principal>) -> Self {
        Self { tokens }
    }

    /// Register a token (builder style)
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> ChatResult<Principal> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ChatError::AuthRejected {
                reason: "unknown or expired token".to_string(),
            })
    }
}

/// Extract a bearer token from an `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn verifier() -> StaticTokenVerifier {
        StaticTokenVerifier::new().with_token("t-ali", Principal::new("u1", "Ali"))
    }

    #[tokio::test]
    async fn test_verify_known_token() {
        let principal = verifier().verify("t-ali").await.unwrap();
        assert_eq!(principal.name, "Ali");
        assert_eq!(principal.id, "u1");
    }

    #[tokio::test]
    async fn test_verify_unknown_token_rejected() {
        let err = verifier().verify("nope").await.unwrap_err();
        assert_eq!(err.error_code(), "AUTH_REJECTED");
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
