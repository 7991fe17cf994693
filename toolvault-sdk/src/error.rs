//! Error types for the token-exchange client

use crate::types::OAuthErrorResponse;
use thiserror::Error;

/// Errors that can occur when calling the token endpoint
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The authorization server refused the exchange (bad subject token,
    /// missing connection grant, unauthorized client)
    #[error("Exchange refused: {0}")]
    Unauthorized(String),

    /// Malformed request (bad parameters, unknown connection)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limited by the authorization server
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authorization server unavailable or failing
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Connection, timeout or other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Success status but the body was not a token response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration (missing domain, bad HTTP client settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// Returns true if the authorization server answered and denied the
    /// exchange, as opposed to being unreachable or failing
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            ExchangeError::Unauthorized(_) | ExchangeError::InvalidRequest(_)
        )
    }

    /// Returns true if the failure is transient infrastructure trouble
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimited(_)
                | ExchangeError::ServiceUnavailable(_)
                | ExchangeError::Network(_)
        )
    }

    /// Classify a non-success response from the token endpoint
    pub fn from_status(status_code: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<OAuthErrorResponse>(body).ok();
        let msg = match &parsed {
            Some(err) => match &err.error_description {
                Some(desc) => format!("{} ({})", desc, err.error),
                None => err.error.clone(),
            },
            None if body.trim().is_empty() => format!("HTTP {}", status_code),
            None => format!("HTTP {}: {}", status_code, body.trim()),
        };
        let code = parsed.as_ref().map(|e| e.error.as_str()).unwrap_or("");

        match (status_code, code) {
            (401, _) | (403, _) => ExchangeError::Unauthorized(msg),
            (_, "invalid_grant")
            | (_, "unauthorized_client")
            | (_, "access_denied")
            | (_, "federated_connection_refresh_token_not_found") => {
                ExchangeError::Unauthorized(msg)
            }
            (429, _) => ExchangeError::RateLimited(msg),
            (500..=599, _) => ExchangeError::ServiceUnavailable(msg),
            (400, _) | (404, _) | (_, "invalid_request") => ExchangeError::InvalidRequest(msg),
            _ => ExchangeError::Other(msg),
        }
    }

    /// Classify a transport-level failure
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ExchangeError::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            ExchangeError::Network(format!("Request failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            ExchangeError::Other(err.to_string())
        }
    }
}
