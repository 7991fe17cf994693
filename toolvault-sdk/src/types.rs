//! Wire types for the federated-connection token exchange

use serde::{Deserialize, Serialize};

/// Grant type for exchanging a subject token for a federated-connection access token
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str =
    "urn:auth0:params:oauth:grant-type:token-exchange:federated-connection-access-token";

/// Token type requested from the exchange
pub const FEDERATED_CONNECTION_ACCESS_TOKEN: &str =
    "http://auth0.com/oauth/token-type/federated-connection-access-token";

/// Subject token type URN for refresh tokens
pub const SUBJECT_TYPE_REFRESH_TOKEN: &str = "urn:ietf:params:oauth:token-type:refresh_token";

/// Subject token type URN for access tokens
pub const SUBJECT_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

// ============================================================================
// Subject Token Type
// ============================================================================

/// The kind of token presented as the exchange subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectTokenType {
    /// The user's refresh token.
    #[serde(rename = "urn:ietf:params:oauth:token-type:refresh_token")]
    RefreshToken,

    /// A raw access token issued to the user.
    #[serde(rename = "urn:ietf:params:oauth:token-type:access_token")]
    AccessToken,
}

impl SubjectTokenType {
    /// The URN sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectTokenType::RefreshToken => SUBJECT_TYPE_REFRESH_TOKEN,
            SubjectTokenType::AccessToken => SUBJECT_TYPE_ACCESS_TOKEN,
        }
    }
}

impl std::fmt::Display for SubjectTokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request
// ============================================================================

/// Body of a token-exchange request.
///
/// Client credentials are filled in by the [`crate::ExchangeClient`] that
/// sends the request, so callers only describe the subject and target.
#[derive(Clone, Serialize)]
pub struct TokenExchangeRequest {
    pub grant_type: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub subject_token_type: SubjectTokenType,

    pub subject_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,

    pub connection: String,

    pub requested_token_type: &'static str,
}

impl TokenExchangeRequest {
    /// Create a request exchanging `subject_token` for a token on `connection`.
    pub fn new(
        subject_token_type: SubjectTokenType,
        subject_token: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
            client_id: None,
            client_secret: None,
            subject_token_type,
            subject_token: subject_token.into(),
            login_hint: None,
            connection: connection.into(),
            requested_token_type: FEDERATED_CONNECTION_ACCESS_TOKEN,
        }
    }

    /// Attach a login hint identifying the upstream account.
    pub fn with_login_hint(mut self, login_hint: Option<String>) -> Self {
        self.login_hint = login_hint;
        self
    }
}

impl std::fmt::Debug for TokenExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("subject_token_type", &self.subject_token_type)
            .field("subject_token", &"[REDACTED]")
            .field("login_hint", &self.login_hint)
            .field("connection", &self.connection)
            .field("requested_token_type", &self.requested_token_type)
            .finish()
    }
}

// ============================================================================
// Response
// ============================================================================

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scopes, space (or comma) separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

impl TokenResponse {
    /// A bare response carrying only an access token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".to_string()),
            expires_in: None,
            scope: None,
            refresh_token: None,
            id_token: None,
            issued_token_type: None,
        }
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("issued_token_type", &self.issued_token_type)
            .finish()
    }
}

/// OAuth error body returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,

    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_wire_names() {
        let request = TokenExchangeRequest::new(
            SubjectTokenType::RefreshToken,
            "rt-123",
            "google-oauth2",
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["grant_type"], TOKEN_EXCHANGE_GRANT_TYPE);
        assert_eq!(json["subject_token_type"], SUBJECT_TYPE_REFRESH_TOKEN);
        assert_eq!(json["subject_token"], "rt-123");
        assert_eq!(json["connection"], "google-oauth2");
        assert_eq!(json["requested_token_type"], FEDERATED_CONNECTION_ACCESS_TOKEN);
    }

    #[test]
    fn test_request_omits_absent_optionals() {
        let request =
            TokenExchangeRequest::new(SubjectTokenType::AccessToken, "at", "github");
        let json = serde_json::to_value(&request).unwrap();
        let obj = json.as_object().unwrap();

        assert!(!obj.contains_key("client_id"));
        assert!(!obj.contains_key("client_secret"));
        assert!(!obj.contains_key("login_hint"));
    }

    #[test]
    fn test_request_debug_redacts_secrets() {
        let mut request =
            TokenExchangeRequest::new(SubjectTokenType::RefreshToken, "very-secret", "github");
        request.client_secret = Some("shh".to_string());
        let debug = format!("{:?}", request);

        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("shh"));
        assert!(debug.contains("github"));
    }

    #[test]
    fn test_response_deserializes_minimal_body() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(response.access_token, "abc");
        assert!(response.expires_in.is_none());
        assert!(response.scope.is_none());
    }

    #[test]
    fn test_subject_token_type_display() {
        assert_eq!(
            SubjectTokenType::AccessToken.to_string(),
            "urn:ietf:params:oauth:token-type:access_token"
        );
    }
}
