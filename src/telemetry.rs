//! Telemetry metric name constants.
//!
//! Centralised metric names for cache and invalidation operations. Consumers
//! install their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `rescache_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `schema`: schema identity of the cached or invalidated resource
//! - `operation`: store call that failed (`get`, `set` or `lock_check`)

/// Reads served from the store.
///
/// Labels: `schema`.
pub const CACHE_HITS_TOTAL: &str = "rescache_cache_hits_total";

/// Reads that fell through to the wrapped operation.
///
/// Labels: `schema`.
pub const CACHE_MISSES_TOTAL: &str = "rescache_cache_misses_total";

/// Reads that skipped the store because the key was locked.
///
/// Labels: `schema`.
pub const LOCK_BYPASSES_TOTAL: &str = "rescache_lock_bypasses_total";

/// Stored entries that could not be decoded and were treated as a miss.
///
/// Labels: `schema`.
pub const DECODE_FAILURES_TOTAL: &str = "rescache_decode_failures_total";

/// Store failures swallowed on the read path.
///
/// Labels: `schema`, `operation`.
pub const STORE_ERRORS_TOTAL: &str = "rescache_store_errors_total";

/// Lock entries written by invalidations.
///
/// Labels: `schema`.
pub const LOCKS_ACQUIRED_TOTAL: &str = "rescache_locks_acquired_total";

/// Invalidating calls aborted because a lock could not be recorded.
///
/// Labels: none.
pub const INVALIDATION_FAILURES_TOTAL: &str = "rescache_invalidation_failures_total";
