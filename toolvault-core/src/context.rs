//! Call-scoped authorization context.
//!
//! While a protected call runs, its [`InFlightState`] is available to any
//! code awaited within it through [`current`], [`access_token`] and
//! [`credentials`]. The state lives in a Tokio task-local, so concurrent
//! calls on different tasks never see each other's state, and it is gone
//! once the call's future completes or is dropped.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::config::CredentialsContext;
use crate::credentials::TokenSet;
use crate::error::{Error, Result};

tokio::task_local! {
    static IN_FLIGHT: Arc<InFlightState>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// Caller-supplied correlation key for credential caching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ExecutionContext {
    /// Context for a conversation thread.
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    /// Resolve the namespace path for the given caching granularity.
    ///
    /// Fails with [`Error::MissingContext`] if a field the mode needs is unset.
    pub fn namespace_path(&self, mode: CredentialsContext) -> Result<Vec<String>> {
        let mut path = vec!["Threads".to_string(), required(&self.thread_id, "thread_id")?];

        if matches!(mode, CredentialsContext::Tool | CredentialsContext::ToolCall) {
            path.push("Tools".to_string());
            path.push(required(&self.tool_name, "tool_name")?);
        }

        if mode == CredentialsContext::ToolCall {
            path.push("ToolCalls".to_string());
            path.push(required(&self.tool_call_id, "tool_call_id")?);
        }

        Ok(path)
    }
}

fn required(field: &Option<String>, name: &str) -> Result<String> {
    field
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::MissingContext(format!("execution context has no {}", name)))
}

// ============================================================================
// In-flight State
// ============================================================================

/// State of one protected call.
#[derive(Debug)]
pub struct InFlightState {
    context: ExecutionContext,
    connection: String,
    scopes: Vec<String>,
    authorization_params: Option<BTreeMap<String, Value>>,
    credentials: RwLock<Option<TokenSet>>,
    current_scopes: RwLock<Vec<String>>,
}

impl InFlightState {
    pub fn new(
        context: ExecutionContext,
        connection: impl Into<String>,
        scopes: Vec<String>,
        authorization_params: Option<BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            context,
            connection: connection.into(),
            scopes,
            authorization_params,
            credentials: RwLock::new(None),
            current_scopes: RwLock::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Scopes required by the protecting policy.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn authorization_params(&self) -> Option<&BTreeMap<String, Value>> {
        self.authorization_params.as_ref()
    }

    /// The credential attached to this call, once resolved.
    pub fn credentials(&self) -> Option<TokenSet> {
        self.credentials.read().clone()
    }

    pub fn set_credentials(&self, credentials: TokenSet) {
        *self.credentials.write() = Some(credentials);
    }

    /// Scopes granted to the attached credential.
    pub fn current_scopes(&self) -> Vec<String> {
        self.current_scopes.read().clone()
    }

    pub fn set_current_scopes(&self, scopes: Vec<String>) {
        *self.current_scopes.write() = scopes;
    }
}

// ============================================================================
// Task-local access
// ============================================================================

/// Run `future` with `state` active.
///
/// Returns [`Error::NestedCall`] without running the future if a state is
/// already active on this task.
///
/// The state is a Tokio task-local. It is visible to `future` and to
/// everything it awaits, but not to tasks started with `tokio::spawn` from
/// inside it. A spawned task sees no active call, so [`current`] fails there
/// and a protected call made from it is not detected as nested. To use the
/// credential in a spawned task, move `current()?` into it and wrap its body
/// in `run` again.
pub async fn run<F>(state: Arc<InFlightState>, future: F) -> Result<F::Output>
where
    F: Future,
{
    if is_active() {
        return Err(Error::NestedCall);
    }

    log::debug!(
        "Activating authorization context for connection '{}'",
        state.connection()
    );
    Ok(IN_FLIGHT.scope(state, future).await)
}

/// Check whether a protected call is active on this task.
pub fn is_active() -> bool {
    IN_FLIGHT.try_with(|_| ()).is_ok()
}

/// The active state, if any.
pub fn try_current() -> Option<Arc<InFlightState>> {
    IN_FLIGHT.try_with(Arc::clone).ok()
}

/// The active state.
pub fn current() -> Result<Arc<InFlightState>> {
    try_current().ok_or_else(|| {
        Error::MissingContext("no token vault authorization is active".to_string())
    })
}

/// Full credential of the active protected call.
pub fn credentials() -> Result<TokenSet> {
    current()?.credentials().ok_or_else(|| {
        Error::MissingContext("no credential attached to the active call".to_string())
    })
}

/// Access token of the active protected call.
///
/// This is how wrapped tool code obtains the third-party token.
pub fn access_token() -> Result<String> {
    Ok(credentials()?.access_token)
}
