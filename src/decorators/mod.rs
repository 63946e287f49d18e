//! Caching and invalidation decorators.
//!
//! Both decorators wrap an [`Operation`] and are themselves operations with
//! the same input and output, so they compose with each other and with
//! plain async closures. Wrapping happens once at startup:
//!
//! ```rust
//! use rescache::{
//!     Binding, CacheConfig, CacheError, Invalidation, Operation, ResourceCache, cached,
//!     invalidates,
//! };
//!
//! #[derive(Debug)]
//! struct AppError(String);
//!
//! impl From<CacheError> for AppError {
//!     fn from(err: CacheError) -> Self {
//!         AppError(err.to_string())
//!     }
//! }
//!
//! struct GetUser {
//!     id: u64,
//! }
//!
//! struct RenameUser {
//!     id: u64,
//!     name: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AppError> {
//! let cache = ResourceCache::in_memory(CacheConfig::new());
//!
//! let get_user = cached(&cache, "user", "User", Binding::new().arg("id", |r: &GetUser| r.id))
//!     .wrap(|req: GetUser| async move { Ok::<_, AppError>(format!("user-{}", req.id)) });
//!
//! let rename_user = invalidates(
//!     &cache,
//!     "user",
//!     [Invalidation::new("User", ["id"])],
//!     Binding::new().arg("id", |r: &RenameUser| r.id),
//! )
//! .wrap(|req: RenameUser| async move { Ok::<_, AppError>(req.name) });
//!
//! assert_eq!(get_user.call(GetUser { id: 7 }).await?, "user-7");
//! rename_user.call(RenameUser { id: 7, name: "A".into() }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Read path vs. invalidation path
//!
//! [`Cached`] treats the cache as an optimisation: store failures, timeouts
//! and undecodable entries fall back to the wrapped operation and are never
//! returned to the caller. [`Invalidates`] treats the lock as a correctness
//! requirement: if any lock cannot be written the wrapped operation does not
//! run and the failure is returned, converted into the operation's error
//! type through `From<CacheError>`.

pub mod binding;
pub mod cached;
pub mod invalidates;

pub use binding::{BatchBinding, Binding};
pub use cached::{Cached, CachedBuilder, cached};
pub use invalidates::{Invalidates, InvalidatesBuilder, Invalidation, invalidates, invalidates_batch};

use std::future::Future;

/// An async call taking `I` and returning a fallible result.
///
/// Implemented for every `Fn(I) -> impl Future<Output = Result<T, E>>` and
/// for the decorators in this module.
pub trait Operation<I>: Send + Sync {
    type Output: Send;
    type Error: Send;

    fn call(&self, input: I) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

impl<I, F, Fut, T, E> Operation<I> for F
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    fn call(&self, input: I) -> impl Future<Output = Result<T, E>> + Send {
        self(input)
    }
}
