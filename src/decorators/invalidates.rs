//! Invalidation decorator.
//!
//! [`Invalidates`] wraps a mutating operation. On every call it derives one
//! key per [`Invalidation`] (per argument set, for batch call sites), locks
//! all of them for the lock TTL and only then runs the mutation. While a key
//! is locked, [`Cached`](super::Cached) reads for it skip the stored value,
//! which closes the window where a read racing the mutation would cache the
//! pre-mutation result.
//!
//! Ordering within a call:
//!
//! 1. every key is derived first; a missing argument fails the call before
//!    the store is touched;
//! 2. all locks are written and the locked keys' values deleted; if any
//!    store call fails the mutation does not run;
//! 3. the mutation runs and its result passes through unchanged.
//!
//! Locks are never released early. If a batch fails part-way, the locks that
//! were written stay until their TTL expires.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use super::Operation;
use super::binding::{BatchBinding, Binding};
use crate::key::{Arguments, CacheKey, SchemaId, build_key};
use crate::store::ResourceCache;
use crate::{CacheError, Result, telemetry};

/// Declares which cached resource a mutation invalidates.
///
/// `arguments` names the key arguments of the cached call site whose entry
/// must be locked. By default each is read from the call argument of the
/// same name; [`map_argument`](Self::map_argument) reads it from a
/// differently named one.
///
/// ```rust
/// # use rescache::Invalidation;
/// // The profile cache is keyed on `profile_id`; the mutation receives `user_id`.
/// let invalidation = Invalidation::new("Profile", ["profile_id"])
///     .map_argument("profile_id", "user_id");
/// assert_eq!(invalidation.arguments(), ["profile_id".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    schema: SchemaId,
    arguments: Vec<String>,
    mappings: BTreeMap<String, String>,
}

impl Invalidation {
    pub fn new<S: Into<String>>(
        schema: impl Into<SchemaId>,
        arguments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            schema: schema.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            mappings: BTreeMap::new(),
        }
    }

    /// Source key argument `key_argument` from call argument `call_argument`.
    pub fn map_argument(
        mut self,
        key_argument: impl Into<String>,
        call_argument: impl Into<String>,
    ) -> Self {
        self.mappings
            .insert(key_argument.into(), call_argument.into());
        self
    }

    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Key of the cached entry this invalidation targets for one call.
    pub fn key(&self, prefix: &str, call: &Arguments) -> Result<CacheKey> {
        let mut selected = Arguments::new();
        for name in &self.arguments {
            let source = self.mappings.get(name).unwrap_or(name);
            let value = call.get(source).ok_or_else(|| CacheError::MissingArgument {
                argument: source.clone(),
                schema: self.schema.to_string(),
            })?;
            selected.insert(name.clone(), value.clone());
        }
        build_key(prefix, &self.schema, &self.arguments, &selected)
    }
}

/// Start an invalidating call site that locks one resource per
/// [`Invalidation`].
pub fn invalidates<I: 'static>(
    cache: &ResourceCache,
    prefix: impl Into<String>,
    invalidations: impl IntoIterator<Item = Invalidation>,
    binding: Binding<I>,
) -> InvalidatesBuilder<I> {
    invalidates_batch(cache, prefix, invalidations, binding.into())
}

/// Start an invalidating call site whose mutation touches a collection of
/// resources: every argument set produced by `binding` is locked for every
/// [`Invalidation`].
pub fn invalidates_batch<I>(
    cache: &ResourceCache,
    prefix: impl Into<String>,
    invalidations: impl IntoIterator<Item = Invalidation>,
    binding: BatchBinding<I>,
) -> InvalidatesBuilder<I> {
    InvalidatesBuilder {
        cache: cache.clone(),
        prefix: prefix.into(),
        invalidations: invalidations.into_iter().collect(),
        binding,
        lock_ttl: cache.config().lock_ttl(),
    }
}

/// Builder returned by [`invalidates`] and [`invalidates_batch`].
#[derive(Debug)]
pub struct InvalidatesBuilder<I> {
    cache: ResourceCache,
    prefix: String,
    invalidations: Vec<Invalidation>,
    binding: BatchBinding<I>,
    lock_ttl: Duration,
}

impl<I> InvalidatesBuilder<I> {
    /// Override how long invalidated keys stay locked. Must be non-zero;
    /// a zero TTL fails every call with [`CacheError::Configuration`].
    pub fn lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    pub fn wrap<Op>(self, inner: Op) -> Invalidates<I, Op>
    where
        Op: Operation<I>,
        Op::Error: From<CacheError>,
    {
        Invalidates {
            cache: self.cache,
            prefix: self.prefix,
            invalidations: self.invalidations,
            binding: self.binding,
            lock_ttl: self.lock_ttl,
            inner,
        }
    }
}

/// An [`Operation`] that locks the cache entries it invalidates before
/// running.
pub struct Invalidates<I, Op> {
    cache: ResourceCache,
    prefix: String,
    invalidations: Vec<Invalidation>,
    binding: BatchBinding<I>,
    lock_ttl: Duration,
    inner: Op,
}

impl<I, Op> Invalidates<I, Op> {
    /// Keys a call with `input` locks, in invalidation order.
    pub fn keys_for(&self, input: &I) -> Result<Vec<CacheKey>> {
        Ok(self
            .targets(input)?
            .into_iter()
            .map(|(_, key)| key)
            .collect())
    }

    pub fn invalidations(&self) -> &[Invalidation] {
        &self.invalidations
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    /// The wrapped operation.
    pub fn inner(&self) -> &Op {
        &self.inner
    }

    fn targets(&self, input: &I) -> Result<Vec<(&SchemaId, CacheKey)>> {
        let argument_sets = self.binding.bind(input);
        let mut targets = Vec::with_capacity(argument_sets.len() * self.invalidations.len());
        for arguments in &argument_sets {
            for invalidation in &self.invalidations {
                let key = invalidation.key(&self.prefix, arguments)?;
                targets.push((invalidation.schema(), key));
            }
        }
        Ok(targets)
    }

    async fn lock_all(&self, targets: &[(&SchemaId, CacheKey)]) -> Result<()> {
        let locks = self.cache.locks();
        try_join_all(targets.iter().map(|(schema, key)| async move {
            locks.acquire_lock(key, self.lock_ttl).await?;
            metrics::counter!(telemetry::LOCKS_ACQUIRED_TOTAL, "schema" => schema.to_string())
                .increment(1);
            Ok::<_, CacheError>(())
        }))
        .await?;
        Ok(())
    }
}

impl<I, Op> Operation<I> for Invalidates<I, Op>
where
    I: Send,
    Op: Operation<I>,
    Op::Error: From<CacheError>,
{
    type Output = Op::Output;
    type Error = Op::Error;

    async fn call(&self, input: I) -> std::result::Result<Op::Output, Op::Error> {
        let targets = self.targets(&input)?;

        if let Err(e) = self.lock_all(&targets).await {
            warn!(
                keys = targets.len(),
                error = %e,
                "invalidation lock failed, aborting mutation"
            );
            metrics::counter!(telemetry::INVALIDATION_FAILURES_TOTAL).increment(1);
            return Err(e.into());
        }
        debug!(
            keys = targets.len(),
            lock_ttl = ?self.lock_ttl,
            "invalidation locks acquired"
        );

        self.inner.call(input).await
    }
}
