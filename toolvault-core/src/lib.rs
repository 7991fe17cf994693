//! # toolvault
//!
//! Delegated-credential authorization for AI agent tool calls.
//!
//! A tool that calls a third-party API on behalf of a user needs that
//! user's access token for the API. toolvault obtains it by exchanging the
//! user's own token at the authorization server's token vault, caches it per
//! conversation context, and hands it to the tool through a call-scoped
//! context. When the user has not granted the access, the call returns an
//! [`Interrupt`] a UI can turn into a consent prompt instead of failing.
//!
//! ## Quick Start
//!
//! ```rust
//! use toolvault_core::{
//!     context, AuthorizerConfig, ClientIdentity, ExecutionContext, TokenVaultAuthorizer,
//! };
//!
//! struct ListRepos {
//!     thread_id: String,
//!     refresh_token: Option<String>,
//! }
//!
//! # fn main() -> toolvault_core::Result<()> {
//! let client = ClientIdentity::new("tenant.us.auth0.com")
//!     .with_client_id("client-id")
//!     .with_client_secret("client-secret");
//!
//! let config = AuthorizerConfig::<ListRepos>::builder("github")
//!     .scope("repo")
//!     .refresh_token(|args: &ListRepos| {
//!         let token = args.refresh_token.clone();
//!         async move { token }
//!     })
//!     .build()?;
//!
//! let authorizer = TokenVaultAuthorizer::new(client, config)?;
//!
//! let list_repos = authorizer.protect(
//!     |args: &ListRepos| ExecutionContext::thread(args.thread_id.clone()),
//!     |_args: ListRepos| async move {
//!         let token = context::access_token()?;
//!         Ok::<_, toolvault_core::Error>(format!("listing repos with {} chars", token.len()))
//!     },
//! );
//!
//! // Without a refresh token no exchange is attempted and the user is asked
//! // to authorize the connection.
//! let result = tokio_test::block_on(list_repos.call(ListRepos {
//!     thread_id: "thread-1".to_string(),
//!     refresh_token: None,
//! }));
//!
//! let interrupt = result.unwrap_err().into_interrupt().unwrap();
//! assert_eq!(interrupt.connection, "github");
//! assert_eq!(interrupt.required_scopes, vec!["repo".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! Credentials are cached under the authorizer's [`InstanceId`] and a path
//! derived from the [`ExecutionContext`] at the granularity chosen with
//! [`CredentialsContext`]. The default store is in memory; use
//! [`FileCredentialStore`] or any [`CredentialStore`] implementation with
//! [`TokenVaultAuthorizer::with_store`].
//!
//! ## Errors
//!
//! Returning [`Error::Unauthorized`] from a protected tool evicts the cached
//! credential and yields an `authorization_missing` interrupt carrying the
//! rejection message. See [`Error`] and [`ErrorKind`] for the other
//! categories.

pub mod authorizer;
pub mod cache;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod interrupt;
pub mod store;

pub use authorizer::{Protected, TokenVaultAuthorizer};
pub use cache::{CredentialCache, CREDENTIAL_KEY};
pub use config::{
    Accessor, AuthorizerConfig, AuthorizerConfigBuilder, ClientIdentity, CredentialsContext,
    Parameter, Strategy, TokenSource,
};
pub use context::{ExecutionContext, InFlightState};
pub use credentials::{parse_scopes, TokenSet};
pub use error::{Error, ErrorKind, Result};
pub use identity::InstanceId;
pub use interrupt::{Interrupt, InterruptKind};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, Namespace, StoreError,
};

// Re-export the token endpoint client
pub use toolvault_sdk::{ExchangeClient, ExchangeError, SubjectTokenType, TokenResponse};
