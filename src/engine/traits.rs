//! Core trait definitions for the external collaborators
//!
//! The pipeline talks to two external systems and nothing else:
//!
//! - [`SharedStore`]: the low-latency coordination store (Redis in production).
//!   Holds stock counters, purchased-user sets, locks, ID counters and cached
//!   reads. Every multi-step check runs as one indivisible operation.
//! - [`OrderLedger`]: the durable system of record for orders and stock.

use crate::error::{LedgerError, StoreError};
use crate::types::{UserId, VoucherId, VoucherOrder};
use async_trait::async_trait;
use std::time::Duration;

// =============================================================================
// SharedStore Trait
// =============================================================================

/// Result of the atomic admission script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum AdmissionCode {
    /// Stock taken and user recorded
    Eligible = 0,
    /// No stock left
    OutOfStock = 1,
    /// User already admitted for this voucher
    DuplicateOrder = 2,
    /// Sale window not open yet
    NotStarted = 3,
    /// Sale window closed
    Ended = 4,
    /// Voucher hash is missing
    UnknownVoucher = 5,
}

impl AdmissionCode {
    /// Convert a raw script return value
    ///
    /// Returns None for values outside the script contract.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Eligible),
            1 => Some(Self::OutOfStock),
            2 => Some(Self::DuplicateOrder),
            3 => Some(Self::NotStarted),
            4 => Some(Self::Ended),
            5 => Some(Self::UnknownVoucher),
            _ => None,
        }
    }
}

/// Core trait for the shared coordination store
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Unique identifier for this store backend
    fn store_id(&self) -> &str;

    /// Read a string value; `None` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value, optionally with a physical TTL
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Set only if the key is absent, with a TTL; true when the key was written
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete a key; true when something was removed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment an integer counter, returning the new value
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Write several hash fields at once
    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;

    /// Read one hash field
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Set membership test
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Run the admission check-and-take as one indivisible operation
    ///
    /// See [`LuaScripts::seckill`](crate::redis::LuaScripts::seckill) for the
    /// exact step order.
    async fn eval_admission(
        &self,
        voucher_key: &str,
        orders_key: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<AdmissionCode, StoreError>;

    /// Delete `key` only if it still holds `token`
    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    /// Reset the TTL of `key` only if it still holds `token`
    async fn renew_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError>;
}

// =============================================================================
// OrderLedger Trait
// =============================================================================

/// Narrow interface to the durable order/stock ledger
///
/// These are the only operations the core needs from persistent storage.
#[async_trait]
pub trait OrderLedger: Send + Sync + 'static {
    /// Insert an order row
    ///
    /// Implementations must reject a second row for the same (user, voucher)
    /// pair with [`LedgerError::DuplicateOrder`].
    async fn insert_order(&self, order: &VoucherOrder) -> Result<(), LedgerError>;

    /// Look up the order for a (user, voucher) pair
    async fn find_order(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<Option<VoucherOrder>, LedgerError>;

    /// `UPDATE ... SET stock = stock - 1 WHERE voucher_id = ? AND stock > 0`
    ///
    /// Returns true when a row was updated.
    async fn conditional_decrement_stock(&self, voucher_id: VoucherId)
        -> Result<bool, LedgerError>;

    /// Conditional stock decrement and order insert in one transaction
    ///
    /// Returns false when stock was already zero. On `Ok(false)` or any error
    /// neither the stock nor the order table has changed; a duplicate row is
    /// reported as [`LedgerError::DuplicateOrder`].
    async fn create_order(&self, order: &VoucherOrder) -> Result<bool, LedgerError>;
}
