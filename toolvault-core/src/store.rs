//! Credential storage trait and implementations.
//!
//! Stores are organised as a two-level map: instance identity first, then
//! namespace path plus key. Entries carry an optional absolute expiry and
//! expired entries are never returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::TokenSet;
use crate::identity::InstanceId;

/// Errors that can occur in credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to read credentials from storage.
    #[error("Failed to read credentials: {0}")]
    Read(String),

    /// Failed to write credentials to storage.
    #[error("Failed to write credentials: {0}")]
    Write(String),

    /// IO error during storage operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Location of a cached credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub instance: InstanceId,
    pub path: Vec<String>,
}

impl Namespace {
    pub fn new(instance: InstanceId, path: Vec<String>) -> Self {
        Self { instance, path }
    }

    /// Flatten path and key into the second-level map key.
    pub fn entry_key(&self, key: &str) -> String {
        serde_json::to_string(&(&self.path, key)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: TokenSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: TokenSet, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries = HashMap<String, HashMap<String, Entry>>;

/// Trait for credential storage implementations.
///
/// Implementations must be safe for concurrent use; operations on unrelated
/// namespaces must not interfere with each other.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a credential, or `None` if absent or expired.
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<TokenSet>, StoreError>;

    /// Store a credential. With a `ttl` it expires after that duration.
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: TokenSet,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Remove a credential.
    ///
    /// Returns `true` if an entry was removed, `false` if not found.
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError>;

    /// Remove all credentials.
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<TokenSet>, StoreError> {
        (**self).get(namespace, key).await
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: TokenSet,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        (**self).put(namespace, key, value, ttl).await
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        (**self).delete(namespace, key).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

fn lookup(entries: &Entries, namespace: &Namespace, key: &str) -> Option<TokenSet> {
    entries
        .get(namespace.instance.as_str())
        .and_then(|ns| ns.get(&namespace.entry_key(key)))
        .filter(|entry| !entry.is_expired(Utc::now()))
        .map(|entry| entry.value.clone())
}

fn insert(entries: &mut Entries, namespace: &Namespace, key: &str, entry: Entry) {
    entries
        .entry(namespace.instance.as_str().to_string())
        .or_default()
        .insert(namespace.entry_key(key), entry);
}

fn remove(entries: &mut Entries, namespace: &Namespace, key: &str) -> bool {
    let instance = namespace.instance.as_str();
    let Some(ns) = entries.get_mut(instance) else {
        return false;
    };
    let removed = ns.remove(&namespace.entry_key(key)).is_some();
    if ns.is_empty() {
        entries.remove(instance);
    }
    removed
}

fn purge(entries: &mut Entries) -> usize {
    let now = Utc::now();
    let mut purged = 0;
    entries.retain(|_, ns| {
        let before = ns.len();
        ns.retain(|_, entry| !entry.is_expired(now));
        purged += before - ns.len();
        !ns.is_empty()
    });
    purged
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory credential store.
///
/// Credentials are lost when the process exits. This is the default store
/// used by the authorizer. Expired entries are skipped on read and can be
/// dropped with [`MemoryCredentialStore::purge_expired`].
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<Entries>,
}

impl MemoryCredentialStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&mut self.entries.write())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<TokenSet>, StoreError> {
        Ok(lookup(&self.entries.read(), namespace, key))
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: TokenSet,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        insert(
            &mut self.entries.write(),
            namespace,
            key,
            Entry::new(value, ttl),
        );
        Ok(())
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        Ok(remove(&mut self.entries.write(), namespace, key))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().clear();
        Ok(())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// File-based credential store.
///
/// Credentials are persisted to a JSON file. The file is created
/// automatically when the first credential is stored.
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Option<Entries>>,
}

impl FileCredentialStore {
    /// Create a new file-based store at the given path.
    ///
    /// The file does not need to exist - it will be created when
    /// the first credential is stored.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Drop expired entries and rewrite the file, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.ensure_loaded()?;
        let purged = {
            let mut cache = self.cache.write();
            cache.as_mut().map(purge).unwrap_or(0)
        };
        if purged > 0 {
            self.flush()?;
        }
        Ok(purged)
    }

    /// Load entries from file into cache if not already loaded.
    fn ensure_loaded(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write();
        if cache.is_some() {
            return Ok(());
        }

        let entries = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    StoreError::Read(format!("{}: {}", self.path.display(), e))
                })?
            }
        } else {
            HashMap::new()
        };

        *cache = Some(entries);
        Ok(())
    }

    /// Write cache to file.
    fn flush(&self) -> Result<(), StoreError> {
        let cache = self.cache.read();
        if let Some(ref entries) = *cache {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let json = serde_json::to_string_pretty(entries)?;
            std::fs::write(&self.path, json)
                .map_err(|e| StoreError::Write(format!("{}: {}", self.path.display(), e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<TokenSet>, StoreError> {
        self.ensure_loaded()?;
        let cache = self.cache.read();
        Ok(cache
            .as_ref()
            .and_then(|entries| lookup(entries, namespace, key)))
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: TokenSet,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.ensure_loaded()?;
        {
            let mut cache = self.cache.write();
            if let Some(ref mut entries) = *cache {
                insert(entries, namespace, key, Entry::new(value, ttl));
            }
        }
        self.flush()
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        self.ensure_loaded()?;
        let removed = {
            let mut cache = self.cache.write();
            cache
                .as_mut()
                .map(|entries| remove(entries, namespace, key))
                .unwrap_or(false)
        };
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.ensure_loaded()?;
        {
            let mut cache = self.cache.write();
            if let Some(ref mut entries) = *cache {
                entries.clear();
            }
        }
        self.flush()
    }
}
