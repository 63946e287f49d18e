//! rescache - result caching for service call sites
//!
//! This crate memoizes the results of expensive async operations in a
//! key/value store, keyed on the operation's arguments, and makes the
//! cached entries safe to invalidate from the operations that mutate them.
//!
//! A read site is wrapped with [`cached`]; a mutating site declares which
//! cached resources it affects with [`invalidates`] (or
//! [`invalidates_batch`]). Before a mutation runs, every affected key is
//! locked for a short window; reads for a locked key bypass the store
//! entirely, so a read racing the mutation cannot write stale data back.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rescache::{Binding, CacheConfig, Operation, ResourceCache, cached};
//!
//! struct GetUser {
//!     id: u64,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = ResourceCache::in_memory(CacheConfig::new().enabled(true));
//!
//! let get_user = cached(&cache, "user", "User", Binding::new().arg("id", |r: &GetUser| r.id))
//!     .ttl(Duration::from_secs(60))
//!     .wrap(|req: GetUser| async move { Ok::<_, std::io::Error>(req.id * 2) });
//!
//! assert_eq!(get_user.call(GetUser { id: 21 }).await.unwrap(), 42);
//! // Served from the store this time.
//! assert_eq!(get_user.call(GetUser { id: 21 }).await.unwrap(), 42);
//! # }
//! ```
//!
//! # Failure model
//!
//! The store is an optimisation on the read path: failures and timeouts are
//! logged and counted, and the wrapped operation runs as if the cache were
//! empty. On the invalidation path a lock that cannot be written aborts the
//! mutation with [`CacheError::StoreUnavailable`].

pub mod codec;
pub mod config;
pub mod decorators;
pub mod error;
pub mod key;
pub mod lock;
pub mod store;
pub mod telemetry;
pub mod version;

// Re-export main types at crate root
pub use error::{CacheError, Result};

pub use codec::{Codec, JsonCodec, SerializationFlag};
pub use config::{CacheConfig, Config, DEFAULT_LOCK_TTL, DEFAULT_TTL};
pub use key::{Arguments, CacheKey, SchemaId, build_full_key, build_key};
pub use lock::{LockState, lock_key};
pub use store::{KeyValueStore, MemoryStore, ResourceCache};
pub use version::{BuildInfo, PKG_VERSION};

pub use decorators::{
    BatchBinding, Binding, Cached, CachedBuilder, Invalidates, InvalidatesBuilder, Invalidation,
    Operation, cached, invalidates, invalidates_batch,
};
