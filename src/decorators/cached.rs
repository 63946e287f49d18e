//! Read-through caching decorator.
//!
//! [`Cached`] derives a key from every bound argument of the call, then:
//!
//! 1. if the key is locked by a recent invalidation, calls the wrapped
//!    operation directly without reading or writing the value entry;
//! 2. otherwise reads the entry and returns the decoded value on a hit;
//! 3. on a miss (including unreadable entries and store failures) calls the
//!    wrapped operation and writes the encoded result back with the call
//!    site's TTL.
//!
//! Errors from the wrapped operation are returned as-is and never cached.
//! The lock is checked a second time before writing back, so a result
//! computed while an invalidation landed is returned but not stored.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::Operation;
use super::binding::Binding;
use crate::codec::{Codec, JsonCodec};
use crate::key::{CacheKey, SchemaId, build_full_key};
use crate::store::ResourceCache;
use crate::{Result, telemetry};

/// Start a cached call site.
///
/// `prefix` scopes the keys to one resource type; `schema` identifies the
/// shape of the cached value. The TTL defaults to the cache's configured
/// default and can be overridden with [`CachedBuilder::ttl`].
pub fn cached<I>(
    cache: &ResourceCache,
    prefix: impl Into<String>,
    schema: impl Into<SchemaId>,
    binding: Binding<I>,
) -> CachedBuilder<I> {
    CachedBuilder {
        cache: cache.clone(),
        prefix: prefix.into(),
        schema: schema.into(),
        binding,
        ttl: cache.config().ttl(),
    }
}

/// Builder returned by [`cached`].
#[derive(Debug)]
pub struct CachedBuilder<I> {
    cache: ResourceCache,
    prefix: String,
    schema: SchemaId,
    binding: Binding<I>,
    ttl: Duration,
}

impl<I> CachedBuilder<I> {
    /// Override the TTL of values written by this call site.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Wrap `inner`, storing its results with [`JsonCodec`].
    pub fn wrap<Op>(self, inner: Op) -> Cached<I, Op, JsonCodec<Op::Output>>
    where
        Op: Operation<I>,
        Op::Output: Serialize + DeserializeOwned,
    {
        self.wrap_with(JsonCodec::new(), inner)
    }

    /// Wrap `inner`, storing its results with `codec`.
    pub fn wrap_with<Op, C>(self, codec: C, inner: Op) -> Cached<I, Op, C>
    where
        Op: Operation<I>,
        C: Codec<Op::Output>,
    {
        Cached {
            cache: self.cache,
            prefix: self.prefix,
            schema: self.schema,
            binding: self.binding,
            ttl: self.ttl,
            codec,
            inner,
        }
    }
}

/// An [`Operation`] whose results are cached under a derived key.
pub struct Cached<I, Op, C> {
    cache: ResourceCache,
    prefix: String,
    schema: SchemaId,
    binding: Binding<I>,
    ttl: Duration,
    codec: C,
    inner: Op,
}

impl<I, Op, C> Cached<I, Op, C> {
    /// Key the result of calling with `input` is stored under.
    pub fn key_for(&self, input: &I) -> CacheKey {
        build_full_key(&self.prefix, &self.schema, &self.binding.bind(input))
    }

    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The wrapped operation.
    pub fn inner(&self) -> &Op {
        &self.inner
    }

    // A failed lock check cannot prove the key is writable, so it bypasses
    // the cache like a held lock does.
    async fn is_locked(&self, key: &CacheKey) -> bool {
        match self.cache.locks().is_locked(key).await {
            Ok(locked) => locked,
            Err(e) => {
                warn!(%key, schema = %self.schema, error = %e, "lock check failed, bypassing cache");
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL,
                    "schema" => self.schema.to_string(),
                    "operation" => "lock_check",
                )
                .increment(1);
                true
            }
        }
    }
}

impl<I, Op, C> Cached<I, Op, C>
where
    Op: Operation<I>,
    C: Codec<Op::Output>,
{
    async fn read(&self, key: &CacheKey) -> Option<Op::Output> {
        let bytes = match self.cache.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(%key, schema = %self.schema, error = %e, "cache read failed, treating as miss");
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL,
                    "schema" => self.schema.to_string(),
                    "operation" => "get",
                )
                .increment(1);
                return None;
            }
        };
        match self.codec.deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%key, schema = %self.schema, error = %e, "cached entry unreadable, treating as miss");
                metrics::counter!(telemetry::DECODE_FAILURES_TOTAL, "schema" => self.schema.to_string())
                    .increment(1);
                None
            }
        }
    }

    // Takes the encoded result so no borrow of the output lives across an
    // await; the output type is only required to be `Send`.
    async fn write_back(&self, key: &CacheKey, encoded: Result<Vec<u8>>) {
        if self.is_locked(key).await {
            debug!(%key, schema = %self.schema, "key locked during computation, skipping write");
            return;
        }
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%key, schema = %self.schema, error = %e, "result not encodable, skipping write");
                return;
            }
        };
        if let Err(e) = self.cache.set(key.as_str(), &bytes, self.ttl).await {
            warn!(%key, schema = %self.schema, error = %e, "cache write failed");
            metrics::counter!(telemetry::STORE_ERRORS_TOTAL,
                "schema" => self.schema.to_string(),
                "operation" => "set",
            )
            .increment(1);
        }
    }
}

impl<I, Op, C> Operation<I> for Cached<I, Op, C>
where
    I: Send,
    Op: Operation<I>,
    C: Codec<Op::Output>,
{
    type Output = Op::Output;
    type Error = Op::Error;

    async fn call(&self, input: I) -> std::result::Result<Op::Output, Op::Error> {
        let key = self.key_for(&input);

        if self.is_locked(&key).await {
            debug!(%key, schema = %self.schema, "key locked, bypassing cache");
            metrics::counter!(telemetry::LOCK_BYPASSES_TOTAL, "schema" => self.schema.to_string())
                .increment(1);
            return self.inner.call(input).await;
        }

        if let Some(value) = self.read(&key).await {
            debug!(%key, schema = %self.schema, "cache hit");
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "schema" => self.schema.to_string())
                .increment(1);
            return Ok(value);
        }

        debug!(%key, schema = %self.schema, "cache miss");
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "schema" => self.schema.to_string())
            .increment(1);
        let value = self.inner.call(input).await?;
        let encoded = self.codec.serialize(&value);
        self.write_back(&key, encoded).await;
        Ok(value)
    }
}
