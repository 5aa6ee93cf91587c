//! Redis-backed [`SharedStore`]
//!
//! Plain commands go through [`RedisPool::execute`] and are retried on
//! transient errors. The admission script and `SET NX` run through
//! [`RedisPool::execute_once`]: replaying either after a dropped connection
//! could misreport a write that already happened (an admitted user as a
//! duplicate, an acquired lock as busy).

use crate::engine::traits::{AdmissionCode, SharedStore};
use crate::error::StoreError;

use super::connection::{RedisConfig, RedisPool};
use super::scripts::LuaScripts;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a `SET NX` whose reply was lost, judged from the key's holder
///
/// Values written through `set_nx` are unique per call, so a matching holder
/// means the write landed. `None` when the key is empty and the write may
/// never have reached the server.
fn resolve_unanswered_set_nx(holder: Option<&str>, value: &str) -> Option<bool> {
    holder.map(|h| h == value)
}

/// Shared store backed by a Redis server
pub struct RedisSharedStore {
    pool: Arc<RedisPool>,
    scripts: LuaScripts,
}

impl RedisSharedStore {
    /// Connect to Redis with the given configuration
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let pool = RedisPool::new(config).await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: Arc<RedisPool>) -> Self {
        Self {
            pool,
            scripts: LuaScripts::new(),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedStore for RedisSharedStore {
    fn store_id(&self) -> &str {
        "redis-store-v1"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pool
            .execute(|mut conn| async move {
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<Option<String>>(&mut conn)
                    .await
            })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.pool
            .execute(|mut conn| async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value);
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(ttl_millis(ttl));
                }
                cmd.query_async::<()>(&mut conn).await
            })
            .await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        // Never replayed: a retry after a lost reply would find our own write
        // and report the lock as busy
        let sent = self
            .pool
            .execute_once(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async::<Option<String>>(&mut conn)
                    .await
            })
            .await;

        match sent {
            Ok(reply) => Ok(reply.is_some()),
            Err(e) => {
                let holder = self.get(key).await?;
                match resolve_unanswered_set_nx(holder.as_deref(), value) {
                    Some(acquired) => {
                        warn!(key, acquired, error = %e, "SET NX reply lost, resolved from key");
                        Ok(acquired)
                    },
                    None => Err(e),
                }
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .pool
            .execute(|mut conn| async move { redis::cmd("DEL").arg(key).query_async(&mut conn).await })
            .await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        // INCR is not idempotent; a replay would skip a sequence number, never repeat one
        self.pool
            .execute(|mut conn| async move { redis::cmd("INCR").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.pool
            .execute(|mut conn| async move {
                let mut cmd = redis::cmd("HSET");
                cmd.arg(key);
                for (field, value) in fields {
                    cmd.arg(*field).arg(value);
                }
                cmd.query_async::<()>(&mut conn).await
            })
            .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.pool
            .execute(|mut conn| async move {
                redis::cmd("HGET")
                    .arg(key)
                    .arg(field)
                    .query_async::<Option<String>>(&mut conn)
                    .await
            })
            .await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.pool
            .execute(|mut conn| async move {
                redis::cmd("SISMEMBER")
                    .arg(key)
                    .arg(member)
                    .query_async::<bool>(&mut conn)
                    .await
            })
            .await
    }

    async fn eval_admission(
        &self,
        voucher_key: &str,
        orders_key: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<AdmissionCode, StoreError> {
        let script = self.scripts.seckill();
        let raw: i64 = self
            .pool
            .execute_once(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    script
                        .key(voucher_key)
                        .key(orders_key)
                        .arg(user_id)
                        .arg(now_ms)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;

        debug!(voucher_key, user_id, raw, "Seckill script returned");
        AdmissionCode::from_i64(raw).ok_or(StoreError::UnexpectedScriptResult {
            script: "seckill",
            value: raw,
        })
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let script = self.scripts.unlock();
        let deleted: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move { script.key(key).arg(token).invoke_async(&mut conn).await }
            })
            .await?;
        Ok(deleted == 1)
    }

    async fn renew_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        let script = self.scripts.renew_lock();
        let renewed: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    script
                        .key(key)
                        .arg(token)
                        .arg(ttl_millis(ttl))
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(renewed == 1)
    }
}
