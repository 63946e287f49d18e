//! Invalidation locks.
//!
//! A lock entry marks a cache key as uncacheable for a bounded window after
//! the resource behind it was mutated. While the lock is live, cached reads
//! for that key go straight to the wrapped operation and never touch the
//! stored value, so a read that raced the mutation cannot re-populate the
//! cache with data computed before the write became visible.
//!
//! Locks are ordinary store entries under `"{key}:lock"`. A rendered
//! [`CacheKey`] contains exactly two unescaped `:` separators, so a lock key
//! can never equal a value key. Acquiring a lock also deletes the value
//! entry, so once the lock expires the next read recomputes. There is no
//! release operation: a lock only ends when its TTL expires, which bounds
//! the staleness window at the lock TTL even when the mutation is slow to
//! become visible downstream.

use std::time::Duration;

use tracing::debug;

use crate::key::CacheKey;
use crate::store::ResourceCache;
use crate::{CacheError, Result};

/// Value written under a lock key.
const LOCK_SENTINEL: &[u8] = b"locked";

const LOCK_SUFFIX: &str = ":lock";

/// Store key holding the lock entry for `key`.
pub fn lock_key(key: &CacheKey) -> String {
    format!("{key}{LOCK_SUFFIX}")
}

/// Lock protocol bound to a [`ResourceCache`].
#[derive(Debug, Clone, Copy)]
pub struct LockState<'a> {
    cache: &'a ResourceCache,
}

impl<'a> LockState<'a> {
    pub fn new(cache: &'a ResourceCache) -> Self {
        Self { cache }
    }

    /// Whether an unexpired lock entry exists for `key`.
    pub async fn is_locked(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.cache.get(&lock_key(key)).await?.is_some())
    }

    /// Lock `key` for `lock_ttl` from now and drop its cached value.
    ///
    /// The lock is written before the value is deleted, so a read landing
    /// between the two already sees the lock. Re-acquiring a held lock
    /// restarts the window; it does not add to the remaining time.
    ///
    /// A zero `lock_ttl` is rejected with
    /// [`CacheError::Configuration`]: stores treat a zero TTL as "never
    /// expires", which would make the key uncacheable for good. Any store
    /// failure, including a timeout, is returned as
    /// [`CacheError::StoreUnavailable`].
    pub async fn acquire_lock(&self, key: &CacheKey, lock_ttl: Duration) -> Result<()> {
        if lock_ttl.is_zero() {
            return Err(CacheError::Configuration(format!(
                "lock TTL for {key} must be non-zero"
            )));
        }
        self.cache
            .set(&lock_key(key), LOCK_SENTINEL, lock_ttl)
            .await
            .map_err(|e| e.into_store_failure())?;
        self.cache
            .delete(key.as_str())
            .await
            .map_err(|e| e.into_store_failure())?;
        debug!(%key, ?lock_ttl, "cache key locked");
        Ok(())
    }
}
