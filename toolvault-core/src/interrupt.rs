//! Authorization interrupts.
//!
//! An [`Interrupt`] is what a protected tool call returns instead of a
//! result when the user has not (or no longer) granted the access it needs.
//! It carries everything a UI layer needs to render a consent prompt for
//! the connection and then re-invoke the same call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Why authorization is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// No credential could be obtained for the connection.
    AuthorizationMissing,

    /// A credential was obtained but lacks some required scopes.
    AuthorizationInsufficient,
}

impl InterruptKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            InterruptKind::AuthorizationMissing => "authorization_missing",
            InterruptKind::AuthorizationInsufficient => "authorization_insufficient",
        }
    }
}

impl std::fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A resumable "authorization required" signal.
///
/// # Example
///
/// ```rust
/// use toolvault_core::{Interrupt, InterruptKind};
///
/// let interrupt = Interrupt::insufficient(
///     "github",
///     &["repo".to_string(), "read:org".to_string()],
///     vec!["repo".to_string()],
///     None,
/// );
///
/// assert_eq!(interrupt.kind, InterruptKind::AuthorizationInsufficient);
/// assert_eq!(interrupt.missing_scopes(), vec!["read:org".to_string()]);
///
/// // UI layers that only see JSON can still recognise it
/// let json = serde_json::to_value(&interrupt).unwrap();
/// assert!(Interrupt::is_interrupt(&json));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Interrupt {
    pub kind: InterruptKind,

    /// Human-readable description.
    pub message: String,

    /// Connection the user must authorize.
    pub connection: String,

    /// Scopes configured on the protecting policy.
    pub scopes: Vec<String>,

    /// Scopes to request in the consent flow.
    ///
    /// For insufficient grants this is the union of what was already granted
    /// and what is missing, so an incremental consent keeps existing access.
    pub required_scopes: Vec<String>,

    /// Scopes granted at the time of the interrupt.
    #[serde(default)]
    pub current_scopes: Vec<String>,

    /// Extra parameters to forward to the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_params: Option<BTreeMap<String, Value>>,
}

impl Interrupt {
    /// No credential is available for `connection`.
    pub fn missing(
        connection: impl Into<String>,
        scopes: &[String],
        authorization_params: Option<BTreeMap<String, Value>>,
    ) -> Self {
        let connection = connection.into();
        Self {
            kind: InterruptKind::AuthorizationMissing,
            message: format!(
                "Authorization required to access the Token Vault: {}",
                connection
            ),
            connection,
            scopes: scopes.to_vec(),
            required_scopes: scopes.to_vec(),
            current_scopes: Vec::new(),
            authorization_params,
        }
    }

    /// The credential for `connection` only grants `current_scopes`.
    pub fn insufficient(
        connection: impl Into<String>,
        scopes: &[String],
        current_scopes: Vec<String>,
        authorization_params: Option<BTreeMap<String, Value>>,
    ) -> Self {
        let connection = connection.into();
        let missing: Vec<String> = scopes
            .iter()
            .filter(|s| !current_scopes.contains(s))
            .cloned()
            .collect();

        let mut required_scopes = current_scopes.clone();
        required_scopes.extend(missing.iter().cloned());

        Self {
            kind: InterruptKind::AuthorizationInsufficient,
            message: format!(
                "Authorization required to access the Token Vault: {}. Authorized scopes: {}. Missing scopes: {}",
                connection,
                current_scopes.join(", "),
                missing.join(", ")
            ),
            connection,
            scopes: scopes.to_vec(),
            required_scopes,
            current_scopes,
            authorization_params,
        }
    }

    /// The downstream API rejected the credential for `connection`.
    ///
    /// Same kind as [`Interrupt::missing`]: the user has to authorize the
    /// connection again. `message` is the rejection reported by the API.
    pub fn rejected(
        connection: impl Into<String>,
        message: impl Into<String>,
        scopes: &[String],
        current_scopes: Vec<String>,
        authorization_params: Option<BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            kind: InterruptKind::AuthorizationMissing,
            message: message.into(),
            connection: connection.into(),
            scopes: scopes.to_vec(),
            required_scopes: scopes.to_vec(),
            current_scopes,
            authorization_params,
        }
    }

    /// Required scopes that are not currently granted.
    pub fn missing_scopes(&self) -> Vec<String> {
        self.required_scopes
            .iter()
            .filter(|s| !self.current_scopes.contains(s))
            .cloned()
            .collect()
    }

    /// Check whether a JSON value is a serialized interrupt.
    pub fn is_interrupt(value: &Value) -> bool {
        Self::from_value(value).is_some()
    }

    /// Parse a serialized interrupt.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
