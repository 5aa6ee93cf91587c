//! Configuration management for the seckill core
//!
//! TOML file with per-field defaults, `SECKILL_*` environment overrides and
//! validation. Every section may be omitted.
//!
//! ```toml
//! [redis]
//! url = "redis://127.0.0.1:6379"
//!
//! [seckill]
//! queue_capacity = 1048576
//! workers = 1
//!
//! [cache]
//! rebuild_pool_size = 10
//!
//! [[cache.namespaces]]
//! name = "shop"
//! strategy = "pass_through"
//! ttl_secs = 1800
//!
//! [lock]
//! order_lock_ttl_secs = 1200
//!
//! [monitoring]
//! log_level = "info"
//! ```

use crate::cache::{CacheNamespace, CacheStrategy};
use crate::error::{Error, Result};
use crate::keys;
use crate::redis::{RedisConfig, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Shared store connection
    #[serde(default)]
    pub redis: RedisSection,

    /// Admission and consumer settings
    #[serde(default)]
    pub seckill: SeckillSection,

    /// Cache namespaces and rebuild pool
    #[serde(default)]
    pub cache: CacheSection,

    /// Lock timings
    #[serde(default)]
    pub lock: LockSection,

    /// Logging and metrics
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedisSection {
    /// Server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum in-flight commands
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Retries for idempotent commands
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Use TLS
    #[serde(default)]
    pub tls_enabled: bool,
}

/// Admission and consumer settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SeckillSection {
    /// Capacity of the in-memory order queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Consumer workers sharing the queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Prefix of the order id counter
    #[serde(default = "default_order_id_prefix")]
    pub order_id_prefix: String,

    /// How long shutdown waits for the queue to drain, in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheSection {
    /// Concurrent background rebuilds
    #[serde(default = "default_rebuild_pool_size")]
    pub rebuild_pool_size: usize,

    /// Registered namespaces
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<NamespaceSection>,
}

/// One cache namespace
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamespaceSection {
    /// Namespace name
    pub name: String,

    /// Lookup strategy
    pub strategy: CacheStrategy,

    /// Value TTL in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Null sentinel TTL in seconds
    #[serde(default = "default_null_ttl_secs")]
    pub null_ttl_secs: u64,

    /// Logical lifetime in seconds (`logical_expire` only)
    #[serde(default = "default_logical_ttl_secs")]
    pub logical_ttl_secs: u64,

    /// Build lock TTL in milliseconds
    #[serde(default = "default_build_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Sleep between build lock attempts in milliseconds (`mutex` only)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Build lock attempts before giving up (`mutex` only)
    #[serde(default = "default_namespace_max_retries")]
    pub max_retries: u32,
}

/// Lock settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LockSection {
    /// TTL of the consumer's per-user lock, in seconds
    #[serde(default = "default_order_lock_ttl_secs")]
    pub order_lock_ttl_secs: u64,
}

/// Logging and metrics
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringSection {
    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Collect Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_pool_size() -> u32 { 16 }
fn default_connection_timeout_ms() -> u64 { 5_000 }
fn default_command_timeout_ms() -> u64 { 1_000 }
fn default_max_retries() -> u32 { 3 }
fn default_queue_capacity() -> usize { 1024 * 1024 }
fn default_workers() -> usize { 1 }
fn default_order_id_prefix() -> String { "order".to_string() }
fn default_shutdown_timeout_ms() -> u64 { 10_000 }
fn default_rebuild_pool_size() -> usize { 10 }
fn default_cache_ttl_secs() -> u64 { 30 * 60 }
fn default_null_ttl_secs() -> u64 { 2 * 60 }
fn default_logical_ttl_secs() -> u64 { 20 }
fn default_build_lock_ttl_ms() -> u64 { 10_000 }
fn default_retry_delay_ms() -> u64 { 50 }
fn default_namespace_max_retries() -> u32 { 100 }
fn default_order_lock_ttl_secs() -> u64 { 1200 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

fn default_namespaces() -> Vec<NamespaceSection> {
    vec![
        NamespaceSection::new("shop", CacheStrategy::PassThrough),
        NamespaceSection::new("shop-type", CacheStrategy::PassThrough),
    ]
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: default_max_retries(),
            tls_enabled: false,
        }
    }
}

impl Default for SeckillSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            order_id_prefix: default_order_id_prefix(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            rebuild_pool_size: default_rebuild_pool_size(),
            namespaces: default_namespaces(),
        }
    }
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            order_lock_ttl_secs: default_order_lock_ttl_secs(),
        }
    }
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

impl RedisSection {
    /// Connection pool config for these settings
    pub fn to_redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.url.clone())
            .pool_size(self.pool_size)
            .connection_timeout(Duration::from_millis(self.connection_timeout_ms))
            .command_timeout(Duration::from_millis(self.command_timeout_ms))
            .retry_policy(RetryPolicy {
                max_retries: self.max_retries,
                ..Default::default()
            })
            .tls(self.tls_enabled)
    }
}

impl SeckillSection {
    /// Shutdown drain timeout
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl NamespaceSection {
    /// Namespace entry with default timings
    pub fn new(name: impl Into<String>, strategy: CacheStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            ttl_secs: default_cache_ttl_secs(),
            null_ttl_secs: default_null_ttl_secs(),
            logical_ttl_secs: default_logical_ttl_secs(),
            lock_ttl_ms: default_build_lock_ttl_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_namespace_max_retries(),
        }
    }

    /// Runtime namespace settings
    pub fn to_namespace(&self) -> CacheNamespace {
        CacheNamespace::new(self.name.clone(), self.strategy)
            .ttl(Duration::from_secs(self.ttl_secs))
            .null_ttl(Duration::from_secs(self.null_ttl_secs))
            .logical_ttl(Duration::from_secs(self.logical_ttl_secs))
            .lock_ttl(Duration::from_millis(self.lock_ttl_ms))
            .retries(Duration::from_millis(self.retry_delay_ms), self.max_retries)
    }
}

impl LockSection {
    /// Consumer lock TTL
    pub fn order_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.order_lock_ttl_secs)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Redis
        if let Some(url) = var("SECKILL_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(size) = var("SECKILL_REDIS_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.redis.pool_size = size;
        }

        // Seckill
        if let Some(cap) = var("SECKILL_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.seckill.queue_capacity = cap;
        }
        if let Some(workers) = var("SECKILL_WORKERS").and_then(|v| v.parse().ok()) {
            self.seckill.workers = workers;
        }

        // Cache
        if let Some(pool) = var("SECKILL_REBUILD_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.rebuild_pool_size = pool;
        }

        // Lock
        if let Some(ttl) = var("SECKILL_ORDER_LOCK_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.lock.order_lock_ttl_secs = ttl;
        }

        // Monitoring
        if let Some(log_level) = var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.redis
            .to_redis_config()
            .validate()
            .map_err(Error::Configuration)?;

        if self.seckill.queue_capacity == 0 {
            return Err(Error::Configuration("Queue capacity must be > 0".to_string()));
        }
        if self.seckill.workers == 0 {
            return Err(Error::Configuration("Workers must be > 0".to_string()));
        }
        if self.seckill.order_id_prefix.is_empty() {
            return Err(Error::Configuration("Order id prefix cannot be empty".to_string()));
        }
        if self.cache.rebuild_pool_size == 0 {
            return Err(Error::Configuration("Rebuild pool size must be > 0".to_string()));
        }
        if self.lock.order_lock_ttl_secs == 0 {
            return Err(Error::Configuration("Order lock TTL must be > 0".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for ns in &self.cache.namespaces {
            if ns.name.is_empty() {
                return Err(Error::Configuration("Cache namespace name cannot be empty".to_string()));
            }
            if keys::is_reserved_cache_namespace(&ns.name) {
                return Err(Error::Configuration(format!(
                    "Cache namespace '{}' is reserved for order locks",
                    ns.name
                )));
            }
            if !seen.insert(ns.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "Cache namespace '{}' is defined twice",
                    ns.name
                )));
            }
            if ns.lock_ttl_ms == 0 || ns.max_retries == 0 {
                return Err(Error::Configuration(format!(
                    "Cache namespace '{}' needs a positive lock TTL and retry count",
                    ns.name
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}
