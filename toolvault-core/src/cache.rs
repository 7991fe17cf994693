//! Credential cache keyed by instance identity and execution context.

use std::sync::Arc;

use crate::config::CredentialsContext;
use crate::context::ExecutionContext;
use crate::credentials::TokenSet;
use crate::error::Result;
use crate::identity::InstanceId;
use crate::store::{CredentialStore, Namespace};

/// Key under which the credential of a namespace is stored.
pub const CREDENTIAL_KEY: &str = "credential";

const CREDENTIALS_SEGMENT: &str = "Credentials";

/// Credential cache for one authorizer instance.
#[derive(Clone)]
pub struct CredentialCache {
    store: Arc<dyn CredentialStore>,
    instance: InstanceId,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn CredentialStore>, instance: InstanceId) -> Self {
        Self { store, instance }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Resolve the namespace of `context` at the given granularity.
    pub fn namespace(
        &self,
        context: &ExecutionContext,
        mode: CredentialsContext,
    ) -> Result<Namespace> {
        let mut path = vec![CREDENTIALS_SEGMENT.to_string()];
        path.extend(context.namespace_path(mode)?);
        Ok(Namespace::new(self.instance.clone(), path))
    }

    pub async fn get(&self, namespace: &Namespace) -> Result<Option<TokenSet>> {
        Ok(self.store.get(namespace, CREDENTIAL_KEY).await?)
    }

    /// Cache `value` for as long as the credential is valid.
    pub async fn put(&self, namespace: &Namespace, value: TokenSet) -> Result<()> {
        let ttl = value.ttl();
        Ok(self.store.put(namespace, CREDENTIAL_KEY, value, ttl).await?)
    }

    pub async fn delete(&self, namespace: &Namespace) -> Result<bool> {
        Ok(self.store.delete(namespace, CREDENTIAL_KEY).await?)
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
