//! Tests for the read-through [`Cached`](rescache::Cached) decorator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rescache::{
    Binding, CacheConfig, CacheError, Codec, KeyValueStore, MemoryStore, Operation, ResourceCache,
    Result, cached,
};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

struct GetUser {
    id: u64,
}

#[derive(Debug, PartialEq)]
enum AppError {
    NotFound(u64),
}

/// Wraps a [`MemoryStore`] and counts traffic to value keys (lock keys are
/// excluded).
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    value_gets: AtomicUsize,
    value_sets: AtomicUsize,
}

impl CountingStore {
    fn gets(&self) -> usize {
        self.value_gets.load(Ordering::SeqCst)
    }

    fn sets(&self) -> usize {
        self.value_sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if !key.ends_with(":lock") {
            self.value_gets.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        if !key.ends_with(":lock") {
            self.value_sets.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

/// Store whose every operation fails.
struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
}

fn user_binding() -> Binding<GetUser> {
    Binding::new().arg("id", |r: &GetUser| r.id)
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = std::result::Result<T, AppError>> + Send>>;

/// A `get_user` operation counting its invocations.
fn get_user_op(calls: Arc<AtomicUsize>) -> impl Fn(GetUser) -> BoxFuture<User> + Send + Sync {
    move |req: GetUser| -> BoxFuture<User> {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if req.id == 0 {
                return Err(AppError::NotFound(req.id));
            }
            Ok(User {
                id: req.id,
                name: format!("user-{}", req.id),
            })
        })
    }
}

// ============================================================================
// Read-through
// ============================================================================

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    let first = get_user.call(GetUser { id: 7 }).await.unwrap();
    let second = get_user.call(GetUser { id: 7 }).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.name, "user-7");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_arguments_are_cached_separately() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    get_user.call(GetUser { id: 1 }).await.unwrap();
    get_user.call(GetUser { id: 2 }).await.unwrap();
    get_user.call(GetUser { id: 1 }).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn result_is_stored_under_derived_key() {
    let store = Arc::new(MemoryStore::new());
    let cache = ResourceCache::new(store.clone(), CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls));

    let user = get_user.call(GetUser { id: 7 }).await.unwrap();

    assert_eq!(store.len().await, 1);
    let stored: Option<User> = cache.get_value("user:User:id=7").await.unwrap();
    assert_eq!(stored, Some(user));
    assert_eq!(get_user.key_for(&GetUser { id: 7 }).as_str(), "user:User:id=7");
}

#[tokio::test]
async fn operation_errors_are_returned_and_not_cached() {
    let store = Arc::new(CountingStore::default());
    let cache = ResourceCache::new(store.clone(), CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    assert_eq!(get_user.call(GetUser { id: 0 }).await, Err(AppError::NotFound(0)));
    assert_eq!(get_user.call(GetUser { id: 0 }).await, Err(AppError::NotFound(0)));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.gets(), 2);
    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn entry_expires_after_ttl() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding())
        .ttl(Duration::from_millis(50))
        .wrap(get_user_op(calls.clone()));

    get_user.call(GetUser { id: 7 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    get_user.call(GetUser { id: 7 }).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ttl_defaults_to_cache_config() {
    let cache = ResourceCache::in_memory(CacheConfig::new().default_ttl(Duration::from_secs(42)));
    let get_user = cached(&cache, "user", "User", user_binding())
        .wrap(get_user_op(Arc::new(AtomicUsize::new(0))));
    assert_eq!(get_user.ttl(), Duration::from_secs(42));
}

// ============================================================================
// Failure tolerance
// ============================================================================

#[tokio::test]
async fn undecodable_entry_is_a_miss_and_gets_rewritten() {
    let store = Arc::new(MemoryStore::new());
    let cache = ResourceCache::new(store.clone(), CacheConfig::new());
    cache
        .set("user:User:id=7", b"\x09garbage", Duration::from_secs(60))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    let user = get_user.call(GetUser { id: 7 }).await.unwrap();
    assert_eq!(user.id, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored: Option<User> = cache.get_value("user:User:id=7").await.unwrap();
    assert_eq!(stored, Some(user));
}

#[tokio::test]
async fn entry_of_wrong_shape_is_a_miss() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    cache
        .set_value("user:User:id=7", &vec![1, 2, 3], Duration::from_secs(60))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    assert_eq!(get_user.call(GetUser { id: 7 }).await.unwrap().id, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn store_failures_are_invisible_to_caller() {
    let cache = ResourceCache::new(Arc::new(FailingStore), CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    assert_eq!(get_user.call(GetUser { id: 7 }).await.unwrap().id, 7);
    assert_eq!(get_user.call(GetUser { id: 7 }).await.unwrap().id, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct StalledStore;

#[async_trait]
impl KeyValueStore for StalledStore {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn slow_store_falls_back_to_operation() {
    let config = CacheConfig::new().operation_timeout(Duration::from_millis(20));
    let cache = ResourceCache::new(Arc::new(StalledStore), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let get_user = cached(&cache, "user", "User", user_binding()).wrap(get_user_op(calls.clone()));

    assert_eq!(get_user.call(GetUser { id: 7 }).await.unwrap().id, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Codecs
// ============================================================================

/// Stores `u64` values as 8 little-endian bytes.
struct LeU64Codec;

impl Codec<u64> for LeU64Codec {
    fn serialize(&self, value: &u64) -> Result<Vec<u8>> {
        Ok(value.to_le_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CacheError::Serialization(format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(u64::from_le_bytes(raw))
    }
}

#[tokio::test]
async fn custom_codec_controls_stored_bytes() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let double = cached(&cache, "num", "Double", Binding::new().arg("n", |n: &u64| *n)).wrap_with(
        LeU64Codec,
        move |n: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, AppError>(n * 2) }
        },
    );

    assert_eq!(double.call(21).await, Ok(42));
    assert_eq!(double.call(21).await, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        cache.get("num:Double:n=21").await.unwrap(),
        Some(42u64.to_le_bytes().to_vec())
    );
}

#[tokio::test]
async fn string_results_round_trip() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let greet = cached(&cache, "greet", "Greeting", Binding::new().arg("name", |n: &String| n.clone()))
        .wrap(|name: String| async move { Ok::<_, AppError>(format!("hello {name}")) });

    assert_eq!(greet.call("bob".to_string()).await.unwrap(), "hello bob");
    assert_eq!(greet.call("bob".to_string()).await.unwrap(), "hello bob");
    let raw = cache.get("greet:Greeting:name=bob").await.unwrap().unwrap();
    assert_eq!(raw, b"\x01hello bob".to_vec());
}

// ============================================================================
// Output bounds
// ============================================================================

/// `Send` but not `Sync`.
#[derive(Debug, Serialize, Deserialize)]
struct Tally {
    hits: std::cell::Cell<u64>,
}

#[tokio::test]
async fn send_only_output_is_cached_across_tasks() {
    let cache = ResourceCache::in_memory(CacheConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let tally = Arc::new(
        cached(&cache, "tally", "Tally", Binding::new().arg("n", |n: &u64| *n)).wrap(
            move |n: u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, AppError>(Tally {
                        hits: std::cell::Cell::new(n),
                    })
                }
            },
        ),
    );

    for _ in 0..2 {
        let op = tally.clone();
        let out = tokio::spawn(async move { op.call(3).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.hits.get(), 3);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
