//! Stored representations of cache entries

use crate::error::CacheError;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stored in place of a value the loader reported as not found
pub const NULL_SENTINEL: &str = "";

/// Envelope for `LogicalExpire` namespaces
///
/// Stored without a physical TTL; `expire_at` (unix millis) decides freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalEntry<T> {
    /// Cached value
    pub data: T,
    /// Logical expiry, unix milliseconds
    pub expire_at: i64,
}

impl<T> LogicalEntry<T> {
    /// Entry expiring `ttl` from now
    pub fn expiring_in(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expire_at: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        }
    }

    /// Whether the entry is still fresh at `now_ms`
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        self.expire_at > now_ms
    }

    /// Whether the entry is still fresh
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now().timestamp_millis())
    }
}

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })
}
