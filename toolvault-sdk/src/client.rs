//! Token endpoint client

use crate::error::ExchangeError;
use crate::types::{TokenExchangeRequest, TokenResponse};
use std::time::Duration;

/// Path of the token endpoint relative to the authorization server
const TOKEN_PATH: &str = "/oauth/token";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Client
// ============================================================================

/// Client for the authorization server's token-exchange endpoint
#[derive(Clone)]
pub struct ExchangeClient {
    client: reqwest::Client,
    api_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("api_base", &self.api_base)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ExchangeClient {
    /// Create a client for `https://{domain}` without client credentials
    pub fn new(domain: impl Into<String>) -> Result<Self, ExchangeError> {
        Self::builder().domain(domain).build()
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> ExchangeClientBuilder {
        ExchangeClientBuilder::new()
    }

    /// Full URL of the token endpoint
    pub fn token_url(&self) -> String {
        format!("{}{}", self.api_base, TOKEN_PATH)
    }

    /// Client id sent with every exchange, if configured
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Exchange a subject token for a federated-connection access token.
    ///
    /// Client credentials configured on this client are added to the
    /// request. Any non-success response is classified into an
    /// [`ExchangeError`]; no retry is attempted.
    pub async fn exchange(
        &self,
        mut request: TokenExchangeRequest,
    ) -> Result<TokenResponse, ExchangeError> {
        if request.client_id.is_none() {
            request.client_id = self.client_id.clone();
        }
        if request.client_secret.is_none() {
            request.client_secret = self.client_secret.clone();
        }

        let url = self.token_url();
        log::debug!(
            "exchanging {} for connection '{}' at {}",
            request.subject_token_type,
            request.connection,
            url
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ExchangeError::from_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return response.json::<TokenResponse>().await.map_err(|e| {
                ExchangeError::InvalidResponse(format!("Failed to parse token response: {}", e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ExchangeError::from_status(status.as_u16(), &body))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ExchangeClient`]
///
/// Either [`Self::domain`] or [`Self::api_base`] is required.
pub struct ExchangeClientBuilder {
    api_base: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    timeout: Option<Duration>,
}

impl ExchangeClientBuilder {
    fn new() -> Self {
        Self {
            api_base: None,
            client_id: None,
            client_secret: None,
            timeout: None,
        }
    }

    /// Set the authorization server domain (e.g. `tenant.us.auth0.com`)
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let domain = domain.trim().trim_end_matches('/');
        self.api_base = if domain.is_empty() {
            None
        } else {
            Some(format!("https://{}", domain))
        };
        self
    }

    /// Set a full base URL, scheme included (used for testing)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into().trim_end_matches('/').to_string());
        self
    }

    /// Set the client id
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the request timeout (default: 30s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ExchangeClient, ExchangeError> {
        let api_base = self.api_base.ok_or_else(|| {
            ExchangeError::Configuration("authorization server domain is required".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                ExchangeError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(ExchangeClient {
            client,
            api_base,
            client_id: self.client_id,
            client_secret: self.client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubjectTokenType;

    #[test]
    fn test_builder_requires_domain() {
        let err = ExchangeClient::builder().build().unwrap_err();
        assert!(matches!(err, ExchangeError::Configuration(_)));

        let err = ExchangeClient::builder().domain("  ").build().unwrap_err();
        assert!(matches!(err, ExchangeError::Configuration(_)));
    }

    #[test]
    fn test_token_url_from_domain() {
        let client = ExchangeClient::new("tenant.auth0.com/").unwrap();
        assert_eq!(client.token_url(), "https://tenant.auth0.com/oauth/token");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = ExchangeClient::builder()
            .domain("tenant.auth0.com")
            .client_id("cid")
            .client_secret("top-secret")
            .build()
            .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("cid"));
        assert!(!debug.contains("top-secret"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let client = ExchangeClient::builder()
            .api_base("http://127.0.0.1:1")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let err = client
            .exchange(TokenExchangeRequest::new(
                SubjectTokenType::RefreshToken,
                "rt",
                "github",
            ))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use crate::types::{SubjectTokenType, TOKEN_EXCHANGE_GRANT_TYPE};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_response_json() -> serde_json::Value {
        serde_json::json!({
            "access_token": "ya29.third-party",
            "token_type": "Bearer",
            "expires_in": 3599,
            "scope": "openid https://www.googleapis.com/auth/calendar.freebusy",
            "issued_token_type": "http://auth0.com/oauth/token-type/federated-connection-access-token"
        })
    }

    fn client_for(server: &MockServer) -> ExchangeClient {
        ExchangeClient::builder()
            .api_base(server.uri())
            .client_id("client-abc")
            .client_secret("secret-xyz")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_exchange() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(serde_json::json!({
                "grant_type": TOKEN_EXCHANGE_GRANT_TYPE,
                "client_id": "client-abc",
                "client_secret": "secret-xyz",
                "subject_token_type": "urn:ietf:params:oauth:token-type:refresh_token",
                "subject_token": "rt-user",
                "connection": "google-oauth2",
                "login_hint": "user@example.com",
                "requested_token_type": "http://auth0.com/oauth/token-type/federated-connection-access-token"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .exchange(
                TokenExchangeRequest::new(
                    SubjectTokenType::RefreshToken,
                    "rt-user",
                    "google-oauth2",
                )
                .with_login_hint(Some("user@example.com".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(response.access_token, "ya29.third-party");
        assert_eq!(response.expires_in, Some(3599));
        assert!(response
            .scope
            .as_deref()
            .unwrap()
            .contains("calendar.freebusy"));
    }

    #[tokio::test]
    async fn test_client_without_credentials_omits_them() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ExchangeClient::builder()
            .api_base(mock_server.uri())
            .build()
            .unwrap();
        client
            .exchange(TokenExchangeRequest::new(
                SubjectTokenType::RefreshToken,
                "rt",
                "github",
            ))
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("client_id").is_none());
        assert!(body.get("client_secret").is_none());
    }

    #[tokio::test]
    async fn test_refused_exchange_is_denial() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "unauthorized_client",
                "error_description": "Client is not authorized for token exchange"
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .exchange(TokenExchangeRequest::new(
                SubjectTokenType::AccessToken,
                "at",
                "github",
            ))
            .await
            .unwrap_err();

        assert!(err.is_denial());
        assert!(err.to_string().contains("not authorized"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .exchange(TokenExchangeRequest::new(
                SubjectTokenType::RefreshToken,
                "rt",
                "github",
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .exchange(TokenExchangeRequest::new(
                SubjectTokenType::RefreshToken,
                "rt",
                "github",
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidResponse(_)));
    }
}
