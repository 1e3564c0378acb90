//! Storage bridge.
//!
//! Storage carries an attempt's PKCE verifier, state and nonce across the
//! redirect. It is not a cache: entries live until they are consumed or
//! explicitly cleared, and retention beyond that is the host's concern.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::AuthResult;

/// Key/value storage consumed by the client modules.
///
/// Only last-write-wins per key is required; no ordering or transactions.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> AuthResult<()>;

    /// Returns the value stored under `key`, if any.
    async fn get_item(&self, key: &str) -> AuthResult<Option<String>>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> AuthResult<()>;

    /// Returns `true` if `key` holds a value.
    async fn contains_key(&self, key: &str) -> AuthResult<bool>;

    /// Lists every stored key.
    async fn get_keys(&self) -> AuthResult<Vec<String>>;

    /// Removes everything.
    async fn clear(&self) -> AuthResult<()>;
}

/// In-memory storage.
///
/// Does not survive a process restart, so it only suits tests and hosts
/// where the redirect lands back in the same process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn set_item(&self, key: &str, value: &str) -> AuthResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn remove_item(&self, key: &str) -> AuthResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> AuthResult<bool> {
        Ok(self.items.read().await.contains_key(key))
    }

    async fn get_keys(&self) -> AuthResult<Vec<String>> {
        Ok(self.items.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> AuthResult<()> {
        self.items.write().await.clear();
        Ok(())
    }
}
