//! Redis connection pool with retry logic
//!
//! Wraps one multiplexed connection behind a semaphore that caps in-flight
//! commands, with:
//! - Connection and per-command timeouts
//! - Exponential backoff retries on transient errors
//! - Reconnect on dropped connections
//!
//! # Example
//!
//! ```rust,no_run
//! use seckill_core::redis::{RedisConfig, RedisPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::with_url("redis://localhost:6379")
//!     .pool_size(32)
//!     .command_timeout(Duration::from_millis(200));
//!
//! let pool = RedisPool::new(config).await?;
//! let pong: String = pool
//!     .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::StoreError;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::safe_redis_error;

/// Configuration for the Redis connection pool
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis server URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Maximum number of in-flight commands
    /// Default: 16
    pub pool_size: u32,

    /// Timeout for establishing the connection
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for individual commands
    /// Default: 1 second
    pub command_timeout: Duration,

    /// Retry policy for failed commands
    pub retry_policy: RetryPolicy,

    /// Enable TLS for connections
    /// Default: false
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Create a new config with the specified URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable TLS (`rediss://`)
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size cannot exceed 1000".to_string());
        }
        if self.command_timeout.is_zero() {
            return Err("Command timeout must be greater than 0".to_string());
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err(
                "TLS is enabled but the 'redis-tls' feature is not compiled. \
                 Enable it with: cargo build --features redis-tls"
                    .to_string(),
            );
        }

        if self.tls_enabled != self.url.starts_with("rediss://") {
            return Err(
                "URL scheme does not match TLS setting: use 'rediss://' with TLS \
                 and 'redis://' without"
                    .to_string(),
            );
        }

        Ok(())
    }
}

/// Retry policy with exponential backoff
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    /// Default: 3
    pub max_retries: u32,

    /// Delay before the first retry
    /// Default: 20ms
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    /// Default: 1 second
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    /// Default: 2.0
    pub multiplier: f64,

    /// Add up to 25% random jitter to delays
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let delay_ms = if self.jitter {
            capped * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped
        };

        Duration::from_millis(delay_ms as u64)
    }

    /// Whether another attempt is allowed after `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Redis connection pool
///
/// Redis multiplexes commands over a single connection; the semaphore bounds
/// how many are in flight at once.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    semaphore: Arc<Semaphore>,
}

impl RedisPool {
    /// Create a pool and establish the initial connection
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::ConnectionError)?;

        // error messages go through safe_redis_error so credentials never reach logs
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::ConnectionError(safe_redis_error(&config.url, &e)))?;

        let pool = Self {
            client,
            connection: RwLock::new(None),
            semaphore: Arc::new(Semaphore::new(config.pool_size as usize)),
            config,
        };

        pool.connect().await?;
        debug!("Redis connection pool initialized");
        Ok(pool)
    }

    async fn connect(&self) -> Result<MultiplexedConnection, StoreError> {
        let start = Instant::now();

        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::ConnectionError("Connection timeout".to_string()))?
        .map_err(|e| StoreError::ConnectionError(safe_redis_error(&self.config.url, &e)))?;

        *self.connection.write().await = Some(conn.clone());

        debug!("Redis connection established in {:?}", start.elapsed());
        Ok(conn)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let existing = self.connection.read().await.clone();
        match existing {
            Some(conn) => Ok(conn),
            None => self.connect().await,
        }
    }

    /// Execute a command with timeout and the configured retry policy
    ///
    /// `f` receives a clone of the multiplexed connection and may be called
    /// more than once, so it must be safe to repeat.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        self.execute_with_policy(&self.config.retry_policy, f).await
    }

    /// Execute a command exactly once
    ///
    /// For non-idempotent scripts: a dropped connection may hide a script that
    /// already ran, and replaying it would change the answer.
    pub async fn execute_once<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        self.execute_with_policy(&RetryPolicy::none(), f).await
    }

    async fn execute_with_policy<F, Fut, T>(
        &self,
        policy: &RetryPolicy,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StoreError::ConnectionError("Semaphore closed".to_string()))?;

        let mut attempt = 0;

        loop {
            let conn = self.connection().await?;
            let result = tokio::time::timeout(self.config.command_timeout, f(conn)).await;

            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if policy.should_retry(attempt) && is_retriable_error(&e) {
                        let delay = policy.delay_for_attempt(attempt);
                        warn!(
                            "Redis command failed (attempt {}), retrying in {:?}: {}",
                            attempt + 1,
                            delay,
                            safe_redis_error(&self.config.url, &e)
                        );
                        tokio::time::sleep(delay).await;

                        if is_connection_error(&e) {
                            *self.connection.write().await = None;
                        }
                        attempt += 1;
                        continue;
                    }

                    if is_connection_error(&e) {
                        *self.connection.write().await = None;
                        return Err(StoreError::ConnectionError(safe_redis_error(
                            &self.config.url,
                            &e,
                        )));
                    }
                    return Err(StoreError::CommandError(safe_redis_error(
                        &self.config.url,
                        &e,
                    )));
                },
                Err(_) => {
                    // a timed-out command may still have run on the server
                    return Err(StoreError::ConnectionError("Command timeout".to_string()));
                },
            }
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

fn is_retriable_error(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_connection_refusal()
        || matches!(
            e.kind(),
            redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain
        )
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.command_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = RedisConfig::with_url("");
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(0);
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(1001);
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").command_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_scheme_mismatch() {
        let config = RedisConfig::with_url("rediss://localhost:6380").tls(false);
        assert!(config.validate().is_err());
    }

    #[cfg(not(feature = "redis-tls"))]
    #[test]
    fn test_tls_without_feature() {
        let config = RedisConfig::with_url("rediss://localhost:6380").tls(true);
        assert!(config.validate().unwrap_err().contains("redis-tls"));
    }

    #[test]
    fn test_retry_policy_delay() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: false,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_policy_jitter_bounds() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            jitter: true,
            ..Default::default()
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_retry_policy_should_retry() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(0));
    }
}
