//! Instance identity: a stable fingerprint of an authorizer policy.
//!
//! The identity is the root of every cache namespace, so two authorizers
//! share cached credentials exactly when their policies are equal by value.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::{AuthorizerConfig, ClientIdentity};

/// SHA-256 fingerprint of an authorizer policy, as 64 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(String);

impl InstanceId {
    /// Fingerprint the policy formed by `client` and `config`.
    ///
    /// Accessor functions, the client secret and the login hint are not part
    /// of the fingerprint.
    pub fn compute<A>(client: &ClientIdentity, config: &AuthorizerConfig<A>) -> Self {
        Self(fingerprint(&policy_json(client, config)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn policy_json<A>(client: &ClientIdentity, config: &AuthorizerConfig<A>) -> Value {
    json!({
        "client": {
            "domain": client.domain(),
            "client_id": client.client_id(),
        },
        "connection": config.connection(),
        // already sorted and deduplicated by the builder
        "scopes": config.scopes(),
        "subject_token_type": config.subject_token_type().map(|t| t.as_str()),
        "authorization_params": config.authorization_params(),
        "credentials_context": config.credentials_context(),
    })
}

/// Hash a JSON value deterministically.
///
/// The digest covers the compact JSON text of `value` with the keys of every
/// object in ascending order, whatever order the map iterates in.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    write_canonical(&mut hasher, value);
    format!("{:x}", hasher.finalize())
}

fn write_canonical(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

            hasher.update(b"{");
            for (i, (key, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(hasher, &Value::String(key.clone()));
                hasher.update(b":");
                write_canonical(hasher, field);
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(hasher, item);
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}
