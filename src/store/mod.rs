//! Key/value store abstraction and the shared cache handle.
//!
//! [`KeyValueStore`] is the narrow capability the caching layer needs from a
//! backend: byte values under string keys with a per-entry TTL. Cached
//! values and invalidation lock entries live in the same store.
//!
//! [`ResourceCache`] wraps a store together with its [`CacheConfig`]. It is
//! cheap to clone and is what call sites hand to the decorators. Every store
//! call made through it is bounded by [`CacheConfig::timeout`]; an operation
//! that does not finish in time fails with
//! [`CacheError::StoreUnavailable`].
//!
//! # Implementing a backend
//!
//! A remote backend (memcached, redis) implements [`KeyValueStore`] and is
//! injected with [`ResourceCache::new`]. It must give last-write-wins per key:
//! a `set` that has returned is visible to every later `get`.

pub mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::codec::{decode_json, encode_json};
use crate::config::CacheConfig;
use crate::lock::LockState;
use crate::{CacheError, Result};

/// Byte-valued store with TTL expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Read a value. Returns `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write (or overwrite) a value that expires `ttl` from now.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Shared handle to a store plus the process-wide cache defaults.
#[derive(Clone)]
pub struct ResourceCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl ResourceCache {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Build a cache over a fresh [`MemoryStore`] sized by `config`.
    pub fn in_memory(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::with_max_entries(config.max_entries));
        Self::new(store, config)
    }

    /// Build the cache described by `config`, or `None` when caching is
    /// disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            info!("resource cache disabled");
            return None;
        }
        let cache = Self::in_memory(config.clone());
        info!(
            store = cache.store.name(),
            max_entries = config.max_entries,
            ttl_secs = config.ttl().as_secs(),
            lock_ttl_secs = config.lock_ttl().as_secs(),
            "resource cache enabled"
        );
        Some(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Lock protocol over this cache's store.
    pub fn locks(&self) -> LockState<'_> {
        LockState::new(self)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded("get", self.store.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.bounded("set", self.store.set(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.bounded("delete", self.store.delete(key)).await
    }

    /// Read and decode a value written by [`set_value`](Self::set_value)
    /// or by a cached call site using [`JsonCodec`](crate::JsonCodec).
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => decode_json(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode a value with [`JsonCodec`](crate::JsonCodec) framing and write it.
    pub async fn set_value<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let bytes = encode_json(value)?;
        self.set(key, &bytes, ttl).await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::StoreUnavailable(format!(
                "{} {operation} timed out after {}ms",
                self.store.name(),
                timeout.as_millis()
            ))),
        }
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}
