//! Minimal token-exchange client for toolvault
//!
//! This crate talks to an authorization server's `/oauth/token` endpoint to
//! trade a user's own token (refresh or access token) for an access token
//! scoped to a federated connection such as `google-oauth2` or `github`.
//!
//! # Quick Start
//!
//! ```no_run
//! use toolvault_sdk::{ExchangeClient, SubjectTokenType, TokenExchangeRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ExchangeClient::builder()
//!     .domain("tenant.us.auth0.com")
//!     .client_id("client-id")
//!     .client_secret("client-secret")
//!     .build()?;
//!
//! let request = TokenExchangeRequest::new(
//!     SubjectTokenType::RefreshToken,
//!     "user-refresh-token",
//!     "google-oauth2",
//! );
//!
//! let token = client.exchange(request).await?;
//! println!("expires in {:?}s", token.expires_in);
//! # Ok(())
//! # }
//! ```
//!
//! Failures are classified into [`ExchangeError`] variants so callers can
//! tell an authorization server that refused the exchange apart from one
//! that could not be reached.

mod client;
mod error;
mod types;

pub use client::{ExchangeClient, ExchangeClientBuilder};
pub use error::ExchangeError;
pub use types::{
    OAuthErrorResponse, SubjectTokenType, TokenExchangeRequest, TokenResponse,
    FEDERATED_CONNECTION_ACCESS_TOKEN, SUBJECT_TYPE_ACCESS_TOKEN, SUBJECT_TYPE_REFRESH_TOKEN,
    TOKEN_EXCHANGE_GRANT_TYPE,
};
