//! Third-party credentials obtained through the token vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolvault_sdk::TokenResponse;

/// A scoped third-party credential.
///
/// Built once from a token endpoint response and never mutated. The
/// absolute `expires_at` is computed at creation time so it survives being
/// cached and read back later.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Lifetime in seconds as reported by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenSet {
    /// Build a token set from a token response received at `now`.
    ///
    /// A lifetime too large to represent as a date leaves `expires_at` unset.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at,
            expires_in: response.expires_in,
            scope: response.scope,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
        }
    }

    /// How long this credential may be cached, if it expires at all.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    /// Check whether the credential has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Scopes granted to this credential.
    pub fn granted_scopes(&self) -> Vec<String> {
        parse_scopes(self.scope.as_deref().unwrap_or(""))
    }
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        Self::from_response(response, Utc::now())
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Split a scope string on commas and whitespace.
///
/// Empty entries are dropped and duplicates removed, keeping first-seen order.
pub fn parse_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in scope.split(|c: char| c == ',' || c.is_whitespace()) {
        if !s.is_empty() && !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}
