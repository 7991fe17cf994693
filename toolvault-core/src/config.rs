//! Client identity and per-tool authorizer configuration.
//!
//! A [`ClientIdentity`] names the authorization server (and optionally the
//! client used to authenticate against it). An [`AuthorizerConfig`] describes
//! one protected capability: which connection it needs, with which scopes,
//! and where the user's own token comes from.
//!
//! # Example
//!
//! ```rust
//! use toolvault_core::{AuthorizerConfig, ClientIdentity, CredentialsContext};
//!
//! struct Session {
//!     refresh_token: String,
//! }
//!
//! let client = ClientIdentity::new("tenant.us.auth0.com");
//!
//! let config = AuthorizerConfig::<Session>::builder("google-oauth2")
//!     .scopes(["openid", "https://www.googleapis.com/auth/calendar.freebusy"])
//!     .refresh_token(|session: &Session| {
//!         let token = session.refresh_token.clone();
//!         async move { Some(token) }
//!     })
//!     .credentials_context(CredentialsContext::Thread)
//!     .build()
//!     .unwrap();
//!
//! config.validate_for(&client).unwrap();
//! ```

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use toolvault_sdk::{ExchangeClient, SubjectTokenType};

use crate::error::{Error, Result};

/// Environment variable holding the authorization server domain
pub const ENV_DOMAIN: &str = "AUTH0_DOMAIN";
/// Environment variable holding the client id
pub const ENV_CLIENT_ID: &str = "AUTH0_CLIENT_ID";
/// Environment variable holding the client secret
pub const ENV_CLIENT_SECRET: &str = "AUTH0_CLIENT_SECRET";

// ============================================================================
// Client Identity
// ============================================================================

/// Authorization server client used for token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    domain: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl ClientIdentity {
    /// Identity for the authorization server at `domain`, without client credentials.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().trim_end_matches('/').to_string(),
            client_id: None,
            client_secret: None,
        }
    }

    /// Read the identity from `AUTH0_DOMAIN`, `AUTH0_CLIENT_ID` and
    /// `AUTH0_CLIENT_SECRET`. Only the domain is required.
    pub fn from_env() -> Result<Self> {
        let domain = std::env::var(ENV_DOMAIN).map_err(|_| {
            Error::Config(format!("{} environment variable not set", ENV_DOMAIN))
        })?;

        let mut identity = Self::new(domain);
        identity.client_id = std::env::var(ENV_CLIENT_ID).ok().filter(|s| !s.is_empty());
        identity.client_secret = std::env::var(ENV_CLIENT_SECRET)
            .ok()
            .filter(|s| !s.is_empty());
        identity.validate()?;
        Ok(identity)
    }

    /// Set the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret.
    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn has_client_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Check that the identity can address an authorization server.
    pub fn validate(&self) -> Result<()> {
        if self.domain.is_empty() {
            return Err(Error::Config(
                "authorization server domain must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the token endpoint client for this identity.
    pub fn exchange_client(&self) -> Result<ExchangeClient> {
        let mut builder = ExchangeClient::builder().domain(&self.domain);
        if let Some(id) = &self.client_id {
            builder = builder.client_id(id);
        }
        if let Some(secret) = &self.client_secret {
            builder = builder.client_secret(secret);
        }
        builder.build().map_err(|e| Error::Config(e.to_string()))
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Asynchronous accessor computing a value from the invocation arguments.
pub type Accessor<A> = Arc<dyn Fn(&A) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// A configured value: either fixed, or computed per invocation.
pub enum Parameter<A> {
    Value(String),
    Accessor(Accessor<A>),
}

impl<A> Parameter<A> {
    /// Wrap an async closure as an accessor parameter.
    pub fn accessor<F, Fut>(f: F) -> Self
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Parameter::Accessor(Arc::new(
            move |args: &A| -> BoxFuture<'static, Option<String>> { Box::pin(f(args)) },
        ))
    }

    /// Resolve the value for one invocation.
    pub async fn resolve(&self, args: &A) -> Option<String> {
        match self {
            Parameter::Value(value) => Some(value.clone()),
            Parameter::Accessor(accessor) => accessor(args).await,
        }
    }
}

impl<A> Clone for Parameter<A> {
    fn clone(&self) -> Self {
        match self {
            Parameter::Value(value) => Parameter::Value(value.clone()),
            Parameter::Accessor(accessor) => Parameter::Accessor(Arc::clone(accessor)),
        }
    }
}

impl<A> std::fmt::Debug for Parameter<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parameter::Value(_) => f.write_str("Value([REDACTED])"),
            Parameter::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

/// Where the user's own (subject) token comes from.
pub enum TokenSource<A> {
    RefreshToken(Parameter<A>),
    AccessToken(Parameter<A>),
}

impl<A> std::fmt::Debug for TokenSource<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::RefreshToken(p) => f.debug_tuple("RefreshToken").field(p).finish(),
            TokenSource::AccessToken(p) => f.debug_tuple("AccessToken").field(p).finish(),
        }
    }
}

impl<A> Clone for TokenSource<A> {
    fn clone(&self) -> Self {
        match self {
            TokenSource::RefreshToken(p) => TokenSource::RefreshToken(p.clone()),
            TokenSource::AccessToken(p) => TokenSource::AccessToken(p.clone()),
        }
    }
}

/// Granularity at which credentials are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsContext {
    /// One credential per conversation thread.
    #[default]
    Thread,
    /// One credential per tool within a thread.
    Tool,
    /// One credential per individual tool call.
    ToolCall,
}

impl std::fmt::Display for CredentialsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsContext::Thread => write!(f, "thread"),
            CredentialsContext::Tool => write!(f, "tool"),
            CredentialsContext::ToolCall => write!(f, "tool-call"),
        }
    }
}

/// How the subject token is turned into a third-party credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exchange the user's refresh token.
    RefreshTokenExchange,
    /// Exchange the user's access token (requires client authentication).
    AccessTokenExchange,
    /// The configured access token already is the third-party token.
    Passthrough,
}

// ============================================================================
// Authorizer Config
// ============================================================================

/// Validated policy for one protected capability.
///
/// `A` is the type of the invocation arguments passed to the protected
/// callable; token and login-hint accessors receive a reference to it.
pub struct AuthorizerConfig<A> {
    connection: String,
    scopes: Vec<String>,
    token_source: TokenSource<A>,
    subject_token_type: Option<SubjectTokenType>,
    login_hint: Option<Parameter<A>>,
    authorization_params: Option<BTreeMap<String, Value>>,
    credentials_context: CredentialsContext,
}

impl<A> AuthorizerConfig<A> {
    /// Start configuring access to `connection`.
    pub fn builder(connection: impl Into<String>) -> AuthorizerConfigBuilder<A> {
        AuthorizerConfigBuilder::new(connection)
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Required scopes, normalized (trimmed, deduplicated, sorted).
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn token_source(&self) -> &TokenSource<A> {
        &self.token_source
    }

    pub fn subject_token_type(&self) -> Option<SubjectTokenType> {
        self.subject_token_type
    }

    pub fn login_hint(&self) -> Option<&Parameter<A>> {
        self.login_hint.as_ref()
    }

    pub fn authorization_params(&self) -> Option<&BTreeMap<String, Value>> {
        self.authorization_params.as_ref()
    }

    pub fn credentials_context(&self) -> CredentialsContext {
        self.credentials_context
    }

    /// The acquisition strategy implied by the token source.
    pub fn strategy(&self) -> Strategy {
        match (&self.token_source, self.subject_token_type) {
            (TokenSource::RefreshToken(_), _) => Strategy::RefreshTokenExchange,
            (TokenSource::AccessToken(_), Some(SubjectTokenType::AccessToken)) => {
                Strategy::AccessTokenExchange
            }
            (TokenSource::AccessToken(_), _) => Strategy::Passthrough,
        }
    }

    /// Check the rules that depend on the client identity.
    ///
    /// Exchanging an access token requires both a client id and a client
    /// secret.
    pub fn validate_for(&self, client: &ClientIdentity) -> Result<()> {
        client.validate()?;

        if self.strategy() == Strategy::AccessTokenExchange
            && (client.client_id().is_none() || !client.has_client_secret())
        {
            return Err(Error::Config(
                "client id and client secret must be provided when using an access token for token exchange"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl<A> Clone for AuthorizerConfig<A> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            scopes: self.scopes.clone(),
            token_source: self.token_source.clone(),
            subject_token_type: self.subject_token_type,
            login_hint: self.login_hint.clone(),
            authorization_params: self.authorization_params.clone(),
            credentials_context: self.credentials_context,
        }
    }
}

impl<A> std::fmt::Debug for AuthorizerConfig<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerConfig")
            .field("connection", &self.connection)
            .field("scopes", &self.scopes)
            .field("token_source", &self.token_source)
            .field("subject_token_type", &self.subject_token_type)
            .field("login_hint", &self.login_hint)
            .field("authorization_params", &self.authorization_params)
            .field("credentials_context", &self.credentials_context)
            .finish()
    }
}

/// Builder for [`AuthorizerConfig`]
///
/// Exactly one of the refresh-token or access-token setters must be used.
pub struct AuthorizerConfigBuilder<A> {
    connection: String,
    scopes: Vec<String>,
    refresh_token: Option<Parameter<A>>,
    access_token: Option<Parameter<A>>,
    subject_token_type: Option<SubjectTokenType>,
    login_hint: Option<Parameter<A>>,
    authorization_params: Option<BTreeMap<String, Value>>,
    credentials_context: Option<CredentialsContext>,
}

impl<A> AuthorizerConfigBuilder<A> {
    fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            scopes: Vec::new(),
            refresh_token: None,
            access_token: None,
            subject_token_type: None,
            login_hint: None,
            authorization_params: None,
            credentials_context: None,
        }
    }

    /// Add required scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Add a single required scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Obtain the user's refresh token per invocation.
    pub fn refresh_token<F, Fut>(mut self, accessor: F) -> Self
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.refresh_token = Some(Parameter::accessor(accessor));
        self
    }

    /// Use a fixed refresh token.
    pub fn refresh_token_value(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(Parameter::Value(token.into()));
        self
    }

    /// Obtain an access token per invocation.
    ///
    /// Combined with [`Self::subject_token_type`] set to
    /// [`SubjectTokenType::AccessToken`] the token is exchanged; otherwise it
    /// is used as the third-party token directly.
    pub fn access_token<F, Fut>(mut self, accessor: F) -> Self
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.access_token = Some(Parameter::accessor(accessor));
        self
    }

    /// Use a fixed access token.
    pub fn access_token_value(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(Parameter::Value(token.into()));
        self
    }

    /// Mark the kind of subject token presented for exchange.
    pub fn subject_token_type(mut self, subject_token_type: SubjectTokenType) -> Self {
        self.subject_token_type = Some(subject_token_type);
        self
    }

    /// Obtain a login hint per invocation.
    pub fn login_hint<F, Fut>(mut self, accessor: F) -> Self
    where
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.login_hint = Some(Parameter::accessor(accessor));
        self
    }

    /// Add an authorization parameter forwarded to consent requests.
    pub fn authorization_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.authorization_params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replace all authorization parameters.
    pub fn authorization_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.authorization_params = Some(params);
        self
    }

    /// Choose the caching granularity (default: [`CredentialsContext::Thread`]).
    pub fn credentials_context(mut self, context: CredentialsContext) -> Self {
        self.credentials_context = Some(context);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<AuthorizerConfig<A>> {
        let connection = self.connection.trim().to_string();
        if connection.is_empty() {
            return Err(Error::Config("connection must not be empty".to_string()));
        }

        let token_source = match (self.refresh_token, self.access_token) {
            (None, None) => {
                return Err(Error::Config(
                    "either a refresh token or an access token must be provided".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "only one of a refresh token or an access token can be provided".to_string(),
                ))
            }
            (Some(refresh), None) => TokenSource::RefreshToken(refresh),
            (None, Some(access)) => TokenSource::AccessToken(access),
        };

        Ok(AuthorizerConfig {
            connection,
            scopes: normalize_scopes(self.scopes),
            token_source,
            subject_token_type: self.subject_token_type,
            login_hint: self.login_hint,
            authorization_params: self.authorization_params,
            credentials_context: self.credentials_context.unwrap_or_default(),
        })
    }
}

fn normalize_scopes(scopes: Vec<String>) -> Vec<String> {
    let mut scopes: Vec<String> = scopes
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    scopes.sort();
    scopes.dedup();
    scopes
}
