//! Cache-wide and per-namespace configuration.
//!
//! Cache-wide settings have defaults and can be overridden with `TICKCACHE_*`
//! environment variables. Namespace configs are registered at build time and
//! immutable afterwards.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::payload::SerializationFormat;

/// Write/refresh policy applied to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Write both tiers synchronously. Remote failure is advisory.
    WriteThrough,
    /// Write the local tier synchronously, flush to remote asynchronously.
    WriteBehind,
    /// Bypass both tiers on write; populate lazily on read miss.
    WriteAround,
    /// Write-through plus asynchronous refresh of soon-to-expire reads.
    RefreshAhead,
}

/// Default share of the TTL that counts as the refresh-ahead window.
pub const DEFAULT_REFRESH_RATIO: f64 = 0.2;

/// Per-namespace cache policy. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Logical namespace, e.g. `stock_quote` or `sentiment_current`.
    pub name: String,
    /// Entry time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Local-tier entry bound; eviction runs before an insert may exceed it.
    pub max_entries: usize,
    /// Write/refresh policy.
    pub strategy: Strategy,
    /// Share of the TTL (from the tail) treated as the refresh window.
    /// Only meaningful for [`Strategy::RefreshAhead`].
    pub refresh_ratio: f64,
    /// Payload wire format for this namespace.
    pub format: SerializationFormat,
}

impl NamespaceConfig {
    /// Creates a config with the default refresh ratio and format.
    pub fn new(name: &str, ttl_seconds: u64, max_entries: usize, strategy: Strategy) -> Self {
        Self {
            name: name.to_string(),
            ttl_seconds,
            max_entries,
            strategy,
            refresh_ratio: DEFAULT_REFRESH_RATIO,
            format: SerializationFormat::default(),
        }
    }

    /// Sets the refresh-ahead window ratio.
    pub fn refresh_ratio(mut self, ratio: f64) -> Self {
        self.refresh_ratio = ratio;
        self
    }

    /// Sets the payload format.
    pub fn format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    /// Entry TTL as a [`Duration`].
    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Validates basic invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidNamespace {
            namespace: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.name.contains(':') {
            return Err(invalid("name must not contain ':'"));
        }
        if self.ttl_seconds == 0 {
            return Err(invalid("ttl_seconds must be > 0"));
        }
        if self.max_entries == 0 {
            return Err(invalid("max_entries must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.refresh_ratio) {
            return Err(invalid("refresh_ratio must be within [0, 1]"));
        }
        if self.strategy == Strategy::RefreshAhead && self.refresh_ratio == 0.0 {
            return Err(invalid("refresh-ahead requires refresh_ratio > 0"));
        }
        Ok(())
    }
}

/// Cache-wide settings loaded from environment variables.
///
/// Use [`CacheConfig::from_env`] to read `TICKCACHE_*` overrides on top of
/// defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Per-call timeout for remote-store operations. Default: `250ms`.
    pub remote_timeout: Duration,

    /// Bound of the write-behind flush queue. Default: `1024`.
    pub write_behind_capacity: usize,

    /// Retry budget for a single write-behind flush. Default: `3`.
    pub write_behind_retries: u32,

    /// Base backoff between flush retries (doubles per attempt).
    /// Default: `50ms`.
    pub write_behind_backoff: Duration,

    /// Deadline for draining the flush queue on shutdown. Default: `5s`.
    pub shutdown_flush_deadline: Duration,

    /// Interval of the background expiry sweeper, or `None` to rely purely on
    /// lazy expiry. Default: `Some(30s)`.
    pub sweep_interval: Option<Duration>,

    /// Upper bound on concurrently running refresh-ahead fetches.
    /// Default: `8`.
    pub max_concurrent_refreshes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_millis(250),
            write_behind_capacity: 1024,
            write_behind_retries: 3,
            write_behind_backoff: Duration::from_millis(50),
            shutdown_flush_deadline: Duration::from_secs(5),
            sweep_interval: Some(Duration::from_secs(30)),
            max_concurrent_refreshes: 8,
        }
    }
}

impl CacheConfig {
    const ENV_REMOTE_TIMEOUT_MS: &'static str = "TICKCACHE_REMOTE_TIMEOUT_MS";
    const ENV_WRITE_BEHIND_CAPACITY: &'static str = "TICKCACHE_WRITE_BEHIND_CAPACITY";
    const ENV_WRITE_BEHIND_RETRIES: &'static str = "TICKCACHE_WRITE_BEHIND_RETRIES";
    const ENV_WRITE_BEHIND_BACKOFF_MS: &'static str = "TICKCACHE_WRITE_BEHIND_BACKOFF_MS";
    const ENV_SHUTDOWN_FLUSH_DEADLINE_MS: &'static str = "TICKCACHE_SHUTDOWN_FLUSH_DEADLINE_MS";
    const ENV_SWEEP_INTERVAL_MS: &'static str = "TICKCACHE_SWEEP_INTERVAL_MS";
    const ENV_MAX_CONCURRENT_REFRESHES: &'static str = "TICKCACHE_MAX_CONCURRENT_REFRESHES";

    /// Loads configuration from environment variables (falling back to
    /// defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let remote_timeout = Duration::from_millis(parse_u64_from_env(
            Self::ENV_REMOTE_TIMEOUT_MS,
            defaults.remote_timeout.as_millis() as u64,
        )?);
        let write_behind_capacity = parse_u64_from_env(
            Self::ENV_WRITE_BEHIND_CAPACITY,
            defaults.write_behind_capacity as u64,
        )? as usize;
        let write_behind_retries = parse_u64_from_env(
            Self::ENV_WRITE_BEHIND_RETRIES,
            u64::from(defaults.write_behind_retries),
        )? as u32;
        let write_behind_backoff = Duration::from_millis(parse_u64_from_env(
            Self::ENV_WRITE_BEHIND_BACKOFF_MS,
            defaults.write_behind_backoff.as_millis() as u64,
        )?);
        let shutdown_flush_deadline = Duration::from_millis(parse_u64_from_env(
            Self::ENV_SHUTDOWN_FLUSH_DEADLINE_MS,
            defaults.shutdown_flush_deadline.as_millis() as u64,
        )?);
        // Sweep interval of 0 disables the background sweeper.
        let sweep_interval = match parse_u64_from_env(
            Self::ENV_SWEEP_INTERVAL_MS,
            defaults
                .sweep_interval
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        )? {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let max_concurrent_refreshes = parse_u64_from_env(
            Self::ENV_MAX_CONCURRENT_REFRESHES,
            defaults.max_concurrent_refreshes as u64,
        )? as usize;

        Ok(Self {
            remote_timeout,
            write_behind_capacity,
            write_behind_retries,
            write_behind_backoff,
            shutdown_flush_deadline,
            sweep_interval,
            max_concurrent_refreshes,
        })
    }
}

fn parse_u64_from_env(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|source| ConfigError::InvalidInteger {
                name,
                value,
                source,
            }),
        Err(_) => Ok(default),
    }
}
