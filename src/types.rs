//! Core data types used throughout the seckill pipeline
//!
//! # Key Types
//!
//! - **`SeckillVoucher`**: A flash-sale voucher with stock and sale window
//! - **`VoucherOrder`**: A durable order row, one per (user, voucher)
//! - **`OrderTask`**: The queued hand-off between admission and persistence
//! - **`OrderStatus`**: What a caller sees when asking about an order
//!
//! # Example
//!
//! ```rust
//! use seckill_core::types::{SeckillVoucher, OrderTask};
//! use chrono::{Duration, Utc};
//!
//! let now = Utc::now();
//! let voucher = SeckillVoucher::new(7, 100, now - Duration::minutes(1), now + Duration::hours(1));
//! assert!(voucher.is_open_at(now));
//!
//! let task = OrderTask::new(1 << 32, 42, 7);
//! assert_eq!(task.user_id, 42);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Voucher identifier
pub type VoucherId = u64;

/// User identifier
pub type UserId = u64;

/// Globally unique order identifier produced by the ID generator
pub type OrderId = u64;

/// A flash-sale voucher
///
/// Stock is owned by the durable ledger. The shared store keeps a derived copy
/// that the admission script decrements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeckillVoucher {
    /// Voucher id
    pub voucher_id: VoucherId,
    /// Remaining stock, never negative
    pub stock: u32,
    /// Sale opens at this instant
    pub begin_time: DateTime<Utc>,
    /// Sale closes at this instant
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    /// Create a new voucher
    pub fn new(
        voucher_id: VoucherId,
        stock: u32,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            voucher_id,
            stock,
            begin_time,
            end_time,
        }
    }

    /// Whether the sale window contains `at` (both ends inclusive)
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        self.begin_time <= at && at <= self.end_time
    }
}

/// A persisted order row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherOrder {
    /// Order id assigned at admission
    pub order_id: OrderId,
    /// Buyer
    pub user_id: UserId,
    /// Purchased voucher
    pub voucher_id: VoucherId,
    /// When the row was written
    pub created_at: DateTime<Utc>,
}

impl VoucherOrder {
    /// Build the row for a dequeued task, stamped with the current time
    pub fn from_task(task: &OrderTask) -> Self {
        Self {
            order_id: task.order_id,
            user_id: task.user_id,
            voucher_id: task.voucher_id,
            created_at: Utc::now(),
        }
    }
}

/// Admitted order waiting for persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTask {
    /// Pre-allocated order id
    pub order_id: OrderId,
    /// Buyer
    pub user_id: UserId,
    /// Voucher
    pub voucher_id: VoucherId,
}

impl OrderTask {
    /// Create a new task
    pub fn new(order_id: OrderId, user_id: UserId, voucher_id: VoucherId) -> Self {
        Self {
            order_id,
            user_id,
            voucher_id,
        }
    }
}

impl fmt::Display for OrderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order {} (user {}, voucher {})",
            self.order_id, self.user_id, self.voucher_id
        )
    }
}

/// Status of a (user, voucher) order as seen by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    /// The order row exists in the ledger
    Persisted(VoucherOrder),
    /// Admitted but not yet written by the consumer
    Pending,
    /// No admission recorded for this pair
    NotFound,
}

impl OrderStatus {
    /// Short label for logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Persisted(_) => "PERSISTED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::NotFound => "NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_voucher_window() {
        let now = Utc::now();
        let voucher = SeckillVoucher::new(1, 10, now, now + Duration::seconds(10));

        assert!(voucher.is_open_at(now));
        assert!(voucher.is_open_at(now + Duration::seconds(10)));
        assert!(!voucher.is_open_at(now - Duration::milliseconds(1)));
        assert!(!voucher.is_open_at(now + Duration::seconds(11)));
    }

    #[test]
    fn test_order_from_task() {
        let task = OrderTask::new(99, 5, 6);
        let order = VoucherOrder::from_task(&task);

        assert_eq!(order.order_id, 99);
        assert_eq!(order.user_id, 5);
        assert_eq!(order.voucher_id, 6);
        assert_eq!(task.to_string(), "order 99 (user 5, voucher 6)");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(OrderStatus::Pending.label(), "PENDING");
        assert_eq!(OrderStatus::NotFound.label(), "NOT_FOUND");
    }
}
