//! In-memory [`KeyValueStore`] backed by moka.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::KeyValueStore;
use crate::Result;

/// Default maximum number of entries in a [`MemoryStore`].
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it was last written with.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    // Overwriting restarts the window instead of extending the old one.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Process-local key/value store with per-entry TTL.
///
/// Uses a bounded LRU cache (moka) so long-running processes cannot grow
/// without limit. A TTL of zero means the entry never expires, matching the
/// memcached convention. Entries are visible to every clone of the owning
/// [`ResourceCache`](crate::ResourceCache) but not across processes.
pub struct MemoryStore {
    entries: Cache<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store with the default max capacity (10,000).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom max capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Approximate number of live entries.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).await.map(|entry| entry.bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = Entry {
            bytes: Arc::from(value),
            ttl: (!ttl.is_zero()).then_some(ttl),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
