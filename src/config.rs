// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for cachewire.
//!
//! One struct is built at startup and handed to every policy; nothing reads
//! global state.
//!
//! # Example
//!
//! ```
//! use cachewire::CachewireConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CachewireConfig::default();
//! assert_eq!(config.cache.prefix, "cache");
//! assert_eq!(config.cache.default_ttl_secs, 300);
//!
//! // From TOML
//! let config = CachewireConfig::from_toml_str(r#"
//!     application_name = "billing"
//!
//!     [cache]
//!     prefix = "c"
//!     cache_null = true
//!
//!     [pubsub]
//!     publish_max_attempts = 5
//! "#).unwrap();
//! assert_eq!(config.cache.prefix, "c");
//! assert_eq!(config.pubsub.publish_max_attempts, 5);
//! assert_eq!(config.pubsub.handler_max_attempts, 3);
//! ```

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration.
///
/// All fields have sensible defaults. `redis_url` is only needed when the
/// Redis store is built from config.
#[derive(Debug, Clone, Deserialize)]
pub struct CachewireConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Identity stamped into the `source` of every published envelope.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pubsub: PubSubConfig,
}

/// Cache policy settings (`[cache]`).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Master switch for every policy, pub/sub included.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Namespace for every key: `<prefix>:<group>:<key>`.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// TTL used when a policy declares 0.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Store the null-marker for null results.
    #[serde(default)]
    pub cache_null: bool,

    #[serde(default = "default_null_ttl_secs")]
    pub null_ttl_secs: u64,

    /// SCAN COUNT hint and delete batch size for group eviction.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

/// Pub/sub settings (`[pubsub]`).
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_attempts")]
    pub publish_max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub publish_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub publish_backoff_multiplier: f64,

    #[serde(default = "default_max_attempts")]
    pub handler_max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub handler_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub handler_backoff_multiplier: f64,

    /// Upper bound for a single backoff sleep.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Log full envelopes instead of only the payload type (may contain PII).
    #[serde(default)]
    pub log_payload: bool,
}

fn default_true() -> bool { true }
fn default_application_name() -> String { "cachewire-app".to_string() }
fn default_prefix() -> String { "cache".to_string() }
fn default_ttl_secs() -> u64 { 300 }
fn default_null_ttl_secs() -> u64 { 30 }
fn default_scan_count() -> usize { 500 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 100 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_max_backoff_ms() -> u64 { 30_000 }

impl Default for CachewireConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            application_name: default_application_name(),
            cache: CacheConfig::default(),
            pubsub: PubSubConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_prefix(),
            default_ttl_secs: default_ttl_secs(),
            cache_null: false,
            null_ttl_secs: default_null_ttl_secs(),
            scan_count: default_scan_count(),
        }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            publish_max_attempts: default_max_attempts(),
            publish_backoff_ms: default_backoff_ms(),
            publish_backoff_multiplier: default_backoff_multiplier(),
            handler_max_attempts: default_max_attempts(),
            handler_backoff_ms: default_backoff_ms(),
            handler_backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            log_payload: false,
        }
    }
}

impl CachewireConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "application_name",
                reason: "must not be blank".into(),
            });
        }
        if self.cache.scan_count == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.scan_count",
                reason: "must be at least 1".into(),
            });
        }
        for (field, value) in [
            ("pubsub.publish_backoff_multiplier", self.pubsub.publish_backoff_multiplier),
            ("pubsub.handler_backoff_multiplier", self.pubsub.handler_backoff_multiplier),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid { field, reason: format!("{} is not finite", value) });
            }
        }
        Ok(())
    }

    /// Pub/sub is live only while both switches are on.
    #[must_use]
    pub fn pubsub_active(&self) -> bool {
        self.cache.enabled && self.pubsub.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CachewireConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.null_ttl_secs, 30);
        assert!(!config.cache.cache_null);
        assert_eq!(config.pubsub.publish_backoff_ms, 100);
        assert_eq!(config.pubsub.handler_backoff_multiplier, 2.0);
        assert!(!config.pubsub.log_payload);
        assert!(config.pubsub_active());
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config = CachewireConfig::from_toml_str("").unwrap();
        assert_eq!(config.application_name, "cachewire-app");
        assert_eq!(config.cache.scan_count, 500);
    }

    #[test]
    fn test_pubsub_inactive_when_cache_disabled() {
        let config = CachewireConfig::from_toml_str("[cache]\nenabled = false").unwrap();
        assert!(config.pubsub.enabled);
        assert!(!config.pubsub_active());
    }

    #[test]
    fn test_rejects_zero_scan_count() {
        let err = CachewireConfig::from_toml_str("[cache]\nscan_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cache.scan_count", .. }));
    }

    #[test]
    fn test_rejects_blank_application_name() {
        let err = CachewireConfig::from_toml_str("application_name = \"  \"").unwrap_err();
        assert!(err.to_string().contains("application_name"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = CachewireConfig::from_toml_str("[cache\nprefix = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
