//! Configuration loading.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! [resource_cache]
//! enabled = true
//! max_entries = 10000
//! operation_timeout_ms = 2000
//! default_ttl_secs = 3600
//! default_lock_ttl_secs = 5
//!
//! [build_info]
//! build_num = "5"
//! sha1 = "asdf1234"
//! ```
//!
//! Every field has a default, so an empty file is a valid (disabled)
//! configuration. [`CacheConfig`] doubles as the process-wide defaults
//! handed to every decorator through [`ResourceCache`](crate::ResourceCache).

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::version::BuildInfo;
use crate::{CacheError, Result};

/// Default time-to-live for cached values: 1 hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default time a key stays uncacheable after an invalidation: 5 seconds.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5);

/// Default bound on a single store operation: 2 seconds.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resource_cache: CacheConfig,
    #[serde(default)]
    pub build_info: BuildInfo,
}

/// Resource cache settings.
///
/// ```rust
/// # use rescache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .enabled(true)
///     .default_ttl(Duration::from_secs(600))
///     .default_lock_ttl(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether a cache is built at all. Default: false.
    #[serde(default)]
    pub enabled: bool,
    /// Capacity of the in-memory store. Default: 10,000.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Bound on each store operation, in milliseconds. Default: 2,000.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// TTL for cached values, in seconds. Default: 3,600.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Lock window after an invalidation, in seconds. Default: 5.
    #[serde(default = "default_lock_ttl_secs")]
    pub default_lock_ttl_secs: u64,
    // Sub-second overrides set through the builder methods.
    #[serde(skip)]
    ttl_override: Option<Duration>,
    #[serde(skip)]
    lock_ttl_override: Option<Duration>,
    #[serde(skip)]
    timeout_override: Option<Duration>,
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_operation_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_OPERATION_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL.as_secs()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
            operation_timeout_ms: default_operation_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
            default_lock_ttl_secs: default_lock_ttl_secs(),
            ttl_override: None,
            lock_ttl_override: None,
            timeout_override: None,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the in-memory store capacity.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the TTL used by cached call sites that do not override it.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// Set the lock window used by invalidating call sites that do not
    /// override it.
    pub fn default_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_override = Some(ttl);
        self
    }

    /// Set the bound on each store operation.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl_override
            .unwrap_or(Duration::from_secs(self.default_ttl_secs))
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl_override
            .unwrap_or(Duration::from_secs(self.default_lock_ttl_secs))
    }

    /// Reject settings that cannot work: a zero lock TTL would be stored
    /// as a lock that never expires.
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl().is_zero() {
            return Err(CacheError::Configuration(
                "default_lock_ttl_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_override
            .unwrap_or(Duration::from_millis(self.operation_timeout_ms))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CacheError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CacheError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            CacheError::Configuration(msg) => {
                CacheError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CacheError::Configuration(format!("Failed to parse config: {e}")))?;
        config.resource_cache.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert!(!config.resource_cache.enabled);
        assert_eq!(config.resource_cache.max_entries, 10_000);
        assert_eq!(config.resource_cache.timeout(), Duration::from_secs(2));
        assert_eq!(config.resource_cache.ttl(), DEFAULT_TTL);
        assert_eq!(config.resource_cache.lock_ttl(), DEFAULT_LOCK_TTL);
        assert_eq!(config.build_info, BuildInfo::default());
    }

    #[test]
    fn zero_lock_ttl_is_rejected() {
        let toml = r#"
            [resource_cache]
            default_lock_ttl_secs = 0
        "#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("default_lock_ttl_secs"));
    }

    #[test]
    fn parse_empty_config() {
        let config = Config::from_toml_str("").unwrap();
        assert!(!config.resource_cache.enabled);
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [resource_cache]
            enabled = true
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert!(config.resource_cache.enabled);
        // Defaults preserved
        assert_eq!(config.resource_cache.max_entries, 10_000);
        assert_eq!(config.resource_cache.lock_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [resource_cache]
            enabled = true
            max_entries = 500
            operation_timeout_ms = 250
            default_ttl_secs = 60
            default_lock_ttl_secs = 10

            [build_info]
            build_num = "5"
            sha1 = "asdf1234"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        let cache = &config.resource_cache;
        assert_eq!(cache.max_entries, 500);
        assert_eq!(cache.timeout(), Duration::from_millis(250));
        assert_eq!(cache.ttl(), Duration::from_secs(60));
        assert_eq!(cache.lock_ttl(), Duration::from_secs(10));
        assert_eq!(config.build_info.sha1.as_deref(), Some("asdf1234"));
        assert_eq!(config.build_info.build_num.as_deref(), Some("5"));
    }

    #[test]
    fn builder_overrides_take_precedence() {
        let config = CacheConfig::new()
            .default_ttl(Duration::from_millis(1500))
            .default_lock_ttl(Duration::from_millis(50))
            .operation_timeout(Duration::from_millis(10));
        assert_eq!(config.ttl(), Duration::from_millis(1500));
        assert_eq!(config.lock_ttl(), Duration::from_millis(50));
        assert_eq!(config.timeout(), Duration::from_millis(10));
    }

    #[test]
    fn malformed_config_is_a_configuration_error() {
        let err = Config::from_toml_str("[resource_cache]\nenabled = \"maybe\"").unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Path::new("/nonexistent/rescache.toml"));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
