//! Common test utilities shared across test files.
//!
//! Items here may not be used by all test files, hence the module-level allow.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolvault_core::{
    AuthorizerConfig, ClientIdentity, CredentialStore, ExchangeClient, ExecutionContext,
    Namespace, StoreError, TokenSet, TokenVaultAuthorizer,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CONNECTION: &str = "google-oauth2";
pub const FREEBUSY: &str = "https://www.googleapis.com/auth/calendar.freebusy";

// ===== Tool arguments =====

/// Arguments of a calendar tool call.
#[derive(Debug, Clone)]
pub struct CalendarArgs {
    pub thread_id: String,
    pub tool_call_id: String,
    pub refresh_token: Option<String>,
}

impl CalendarArgs {
    pub fn new(thread_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            tool_call_id: "call-1".to_string(),
            refresh_token: Some("user-refresh-token".to_string()),
        }
    }

    pub fn with_tool_call_id(mut self, id: &str) -> Self {
        self.tool_call_id = id.to_string();
        self
    }

    pub fn without_refresh_token(mut self) -> Self {
        self.refresh_token = None;
        self
    }
}

pub fn calendar_context(args: &CalendarArgs) -> ExecutionContext {
    ExecutionContext::thread(args.thread_id.clone())
        .with_tool_name("check_calendar")
        .with_tool_call_id(args.tool_call_id.clone())
}

// ===== Authorization server =====

pub fn client_identity() -> ClientIdentity {
    ClientIdentity::new("tenant.auth0.com")
        .with_client_id("test-client")
        .with_client_secret("test-secret")
}

pub fn exchange_client(server: &MockServer) -> ExchangeClient {
    ExchangeClient::builder()
        .api_base(server.uri())
        .client_id("test-client")
        .client_secret("test-secret")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn token_body(access_token: &str, scope: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": scope,
        "issued_token_type": "http://auth0.com/oauth/token-type/federated-connection-access-token"
    })
}

/// Mount a token endpoint answering every request with `body`.
pub async fn mount_token_endpoint(server: &MockServer, body: Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn refresh_token_config() -> AuthorizerConfig<CalendarArgs> {
    AuthorizerConfig::builder(CONNECTION)
        .scope(FREEBUSY)
        .refresh_token(|args: &CalendarArgs| {
            let token = args.refresh_token.clone();
            async move { token }
        })
        .build()
        .unwrap()
}

pub fn calendar_authorizer(server: &MockServer) -> TokenVaultAuthorizer<CalendarArgs> {
    TokenVaultAuthorizer::new(client_identity(), refresh_token_config())
        .unwrap()
        .with_exchange_client(exchange_client(server))
}

// ===== Stores =====

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl CredentialStore for FailingStore {
    async fn get(&self, _ns: &Namespace, _key: &str) -> Result<Option<TokenSet>, StoreError> {
        Err(StoreError::Read("backend unavailable".to_string()))
    }

    async fn put(
        &self,
        _ns: &Namespace,
        _key: &str,
        _value: TokenSet,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Write("backend unavailable".to_string()))
    }

    async fn delete(&self, _ns: &Namespace, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Write("backend unavailable".to_string()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Counts calls of a tool body.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
