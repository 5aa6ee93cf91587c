//! Shared store key layout
//!
//! ```text
//! seckill:voucher:{voucher_id}   → HASH {stock, begin, end}
//! seckill:order:{voucher_id}     → SET of user ids that were admitted
//! lock:order:{user_id}           → STRING consumer lock token
//! lock:{namespace}:{id}          → STRING cache build lock token
//! cache:{namespace}:{id}         → STRING JSON payload or "" null sentinel
//! icr:{prefix}:{yyyy:MM:dd}      → STRING daily sequence counter
//! ```

use crate::types::{UserId, VoucherId};
use chrono::NaiveDate;
use std::fmt::Display;

const SECKILL_VOUCHER_PREFIX: &str = "seckill:voucher:";
const SECKILL_ORDER_PREFIX: &str = "seckill:order:";
const ORDER_LOCK_NAMESPACE: &str = "order";
const LOCK_PREFIX: &str = "lock:";
const CACHE_PREFIX: &str = "cache:";
const ID_COUNTER_PREFIX: &str = "icr:";

/// Hash holding stock and sale window for a voucher
pub fn seckill_voucher(voucher_id: VoucherId) -> String {
    format!("{}{}", SECKILL_VOUCHER_PREFIX, voucher_id)
}

/// Set of users already admitted for a voucher
pub fn seckill_orders(voucher_id: VoucherId) -> String {
    format!("{}{}", SECKILL_ORDER_PREFIX, voucher_id)
}

/// Lock resource name for the consumer's per-user lock (without `lock:`)
pub fn order_lock_resource(user_id: UserId) -> String {
    format!("{}:{}", ORDER_LOCK_NAMESPACE, user_id)
}

/// Whether a cache namespace's build locks would land on the consumer's
/// per-user lock keys
pub fn is_reserved_cache_namespace(name: &str) -> bool {
    name == ORDER_LOCK_NAMESPACE
}

/// Full lock key for a resource name
pub fn lock(resource: &str) -> String {
    format!("{}{}", LOCK_PREFIX, resource)
}

/// Cache entry key inside a namespace
pub fn cache(namespace: &str, id: impl Display) -> String {
    format!("{}{}:{}", CACHE_PREFIX, namespace, id)
}

/// Build-lock resource name for a cache entry (without `lock:`)
pub fn cache_build_resource(namespace: &str, id: impl Display) -> String {
    format!("{}:{}", namespace, id)
}

/// Daily ID counter key
pub fn id_counter(prefix: &str, day: NaiveDate) -> String {
    format!("{}{}:{}", ID_COUNTER_PREFIX, prefix, day.format("%Y:%m:%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(seckill_voucher(7), "seckill:voucher:7");
        assert_eq!(seckill_orders(7), "seckill:order:7");
        assert_eq!(lock(&order_lock_resource(42)), "lock:order:42");
        assert_eq!(cache("shop", 3), "cache:shop:3");
        assert_eq!(lock(&cache_build_resource("shop", 3)), "lock:shop:3");
    }

    #[test]
    fn test_order_namespace_is_reserved() {
        assert!(is_reserved_cache_namespace("order"));
        assert!(!is_reserved_cache_namespace("shop"));
        assert!(!is_reserved_cache_namespace("orders"));
        assert_eq!(
            lock(&cache_build_resource("order", 42)),
            lock(&order_lock_resource(42))
        );
    }

    #[test]
    fn test_id_counter_key_is_per_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(id_counter("order", day), "icr:order:2024:03:09");

        let next = day.succ_opt().unwrap();
        assert_ne!(id_counter("order", day), id_counter("order", next));
    }
}
