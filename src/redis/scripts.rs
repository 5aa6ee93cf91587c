//! Lua scripts for atomic Redis operations
//!
//! Redis runs each script to completion before serving another command, which
//! is what makes the check-then-act sequences below race free across every
//! process sharing the server.
//!
//! # Scripts Provided
//!
//! - `seckill`: check window, stock and prior purchase, then take one unit
//! - `unlock`: delete a lock key only if it still holds the caller's token
//! - `renew_lock`: extend a lock's TTL only if it still holds the caller's token
//!
//! # Example
//!
//! ```rust
//! use seckill_core::redis::LuaScripts;
//!
//! let scripts = LuaScripts::new();
//! let seckill = scripts.seckill();
//! assert!(!seckill.get_hash().is_empty());
//! ```

use parking_lot::RwLock;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;

/// Collection of Lua scripts, compiled once and shared
pub struct LuaScripts {
    cache: RwLock<HashMap<&'static str, Arc<Script>>>,
}

impl Default for LuaScripts {
    fn default() -> Self {
        Self::new()
    }
}

impl LuaScripts {
    /// Create an empty script cache
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, name: &'static str, lua: &str) -> Arc<Script> {
        if let Some(script) = self.cache.read().get(name) {
            return Arc::clone(script);
        }

        let mut cache = self.cache.write();
        Arc::clone(
            cache
                .entry(name)
                .or_insert_with(|| Arc::new(Script::new(lua))),
        )
    }

    /// Seckill admission
    ///
    /// # Keys
    /// - KEYS[1]: Voucher hash (seckill:voucher:{id}) with `stock`, `begin`, `end`
    /// - KEYS[2]: Admitted users set (seckill:order:{id})
    ///
    /// # Arguments
    /// - ARGV[1]: User ID
    /// - ARGV[2]: Current time in epoch milliseconds
    ///
    /// # Returns
    /// - 0 eligible (stock decremented, user added)
    /// - 1 out of stock
    /// - 2 user already admitted
    /// - 3 sale not started
    /// - 4 sale ended
    /// - 5 voucher not published
    pub fn seckill(&self) -> Arc<Script> {
        self.get_or_create(
            "seckill",
            r#"
            local voucher_key = KEYS[1]
            local orders_key = KEYS[2]

            local user_id = ARGV[1]
            local now = tonumber(ARGV[2])

            if redis.call('EXISTS', voucher_key) == 0 then
                return 5
            end

            local fields = redis.call('HMGET', voucher_key, 'stock', 'begin', 'end')
            local stock = tonumber(fields[1])
            local begin_at = tonumber(fields[2])
            local end_at = tonumber(fields[3])

            if not stock or not begin_at or not end_at then
                return redis.error_reply('WRONGTYPE voucher hash is malformed')
            end

            if now < begin_at then
                return 3
            end
            if now > end_at then
                return 4
            end

            if stock < 1 then
                return 1
            end

            if redis.call('SISMEMBER', orders_key, user_id) == 1 then
                return 2
            end

            redis.call('HINCRBY', voucher_key, 'stock', -1)
            redis.call('SADD', orders_key, user_id)

            return 0
            "#,
        )
    }

    /// Token-checked lock release
    ///
    /// # Keys
    /// - KEYS[1]: Lock key
    ///
    /// # Arguments
    /// - ARGV[1]: Holder token
    ///
    /// # Returns
    /// - 1 if the key was deleted
    /// - 0 if it was absent or held by someone else
    pub fn unlock(&self) -> Arc<Script> {
        self.get_or_create(
            "unlock",
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
            "#,
        )
    }

    /// Token-checked TTL extension, used by the lock watchdog
    ///
    /// # Keys
    /// - KEYS[1]: Lock key
    ///
    /// # Arguments
    /// - ARGV[1]: Holder token
    /// - ARGV[2]: New TTL in milliseconds
    ///
    /// # Returns
    /// - 1 if the TTL was reset
    /// - 0 if the lock is no longer ours
    pub fn renew_lock(&self) -> Arc<Script> {
        self.get_or_create(
            "renew_lock",
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('PEXPIRE', KEYS[1], ARGV[2])
            end
            return 0
            "#,
        )
    }
}
