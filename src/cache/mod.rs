//! Read-through cache with per-namespace resilience strategies
//!
//! Every namespace (`shop`, `shop-type`, ...) is registered once with a
//! [`CacheStrategy`]; call sites only name the namespace and supply a loader.
//!
//! # Strategies
//!
//! | Strategy        | Miss handling                                   | Protects against    |
//! |-----------------|-------------------------------------------------|---------------------|
//! | `PassThrough`   | load, cache value or `""` null sentinel         | penetration         |
//! | `Mutex`         | one loader behind a build lock, others retry    | breakdown + penet.  |
//! | `LogicalExpire` | serve stale, rebuild asynchronously             | breakdown, no waits |
//!
//! # Example
//!
//! ```rust,no_run
//! use seckill_core::cache::{CacheClient, CacheNamespace, CacheStrategy};
//! use seckill_core::engine::InMemorySharedStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CacheClient::new(Arc::new(InMemorySharedStore::new()), 10);
//! client.register(CacheNamespace::new("shop", CacheStrategy::PassThrough))?;
//!
//! let name: Option<String> = client
//!     .get("shop", 1, || async { Ok::<_, std::io::Error>(Some("Cafe".to_string())) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod entry;

pub use client::CacheClient;
pub use entry::{LogicalEntry, NULL_SENTINEL};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Strategy applied to every lookup in a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Cache values and negative results with a physical TTL
    PassThrough,
    /// Serialize rebuilds behind a short-lived build lock
    Mutex,
    /// Store without physical TTL, refresh stale entries in the background
    LogicalExpire,
}

impl CacheStrategy {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::PassThrough => "pass_through",
            CacheStrategy::Mutex => "mutex",
            CacheStrategy::LogicalExpire => "logical_expire",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one cache namespace
#[derive(Debug, Clone, PartialEq)]
pub struct CacheNamespace {
    /// Namespace name, the middle segment of `cache:{name}:{id}`
    pub name: String,
    /// Strategy for lookups
    pub strategy: CacheStrategy,
    /// Physical TTL of cached values
    pub ttl: Duration,
    /// Physical TTL of the `""` null sentinel
    pub null_ttl: Duration,
    /// Logical lifetime of entries under `LogicalExpire`
    pub logical_ttl: Duration,
    /// TTL of the build lock
    pub lock_ttl: Duration,
    /// Sleep between build lock attempts under `Mutex`
    pub retry_delay: Duration,
    /// Build lock attempts before giving up
    pub max_retries: u32,
}

impl CacheNamespace {
    /// Namespace with the default timings
    pub fn new(name: impl Into<String>, strategy: CacheStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            ttl: Duration::from_secs(30 * 60),
            null_ttl: Duration::from_secs(2 * 60),
            logical_ttl: Duration::from_secs(20),
            lock_ttl: Duration::from_secs(10),
            retry_delay: Duration::from_millis(50),
            max_retries: 100,
        }
    }

    /// Set the value TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the null sentinel TTL
    pub fn null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Set the logical lifetime
    pub fn logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl = ttl;
        self
    }

    /// Set the build lock TTL
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the retry schedule for `Mutex`
    pub fn retries(mut self, delay: Duration, max_retries: u32) -> Self {
        self.retry_delay = delay;
        self.max_retries = max_retries;
        self
    }
}
