//! Admission: decide eligibility atomically and hand off to the consumer
//!
//! One request costs three awaits: the admission script, the order id
//! increment and a non-blocking queue insert. The ledger is never touched.

use crate::engine::traits::{AdmissionCode, SharedStore};
use crate::error::{AdmissionError, StoreError};
use crate::idgen::IdGenerator;
use crate::keys;
use crate::metrics::SeckillMetrics;
use crate::types::{OrderId, OrderTask, SeckillVoucher, UserId, VoucherId};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info};

/// Default id prefix for order ids
pub const ORDER_ID_PREFIX: &str = "order";

/// Front half of the pipeline
pub struct AdmissionController {
    store: Arc<dyn SharedStore>,
    ids: IdGenerator,
    queue: mpsc::Sender<OrderTask>,
    metrics: Arc<SeckillMetrics>,
    id_prefix: String,
}

impl AdmissionController {
    /// Create a controller feeding `queue`
    pub fn new(
        store: Arc<dyn SharedStore>,
        ids: IdGenerator,
        queue: mpsc::Sender<OrderTask>,
        metrics: Arc<SeckillMetrics>,
    ) -> Self {
        Self {
            store,
            ids,
            queue,
            metrics,
            id_prefix: ORDER_ID_PREFIX.to_string(),
        }
    }

    /// Use a different prefix for order id counters
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Seed the shared store with a voucher's stock and sale window
    ///
    /// Overwrites any previous stock figure; users already admitted stay
    /// recorded.
    pub async fn publish_voucher(&self, voucher: &SeckillVoucher) -> Result<(), StoreError> {
        let key = keys::seckill_voucher(voucher.voucher_id);
        self.store
            .hset_multiple(
                &key,
                &[
                    ("stock", voucher.stock.to_string()),
                    ("begin", voucher.begin_time.timestamp_millis().to_string()),
                    ("end", voucher.end_time.timestamp_millis().to_string()),
                ],
            )
            .await?;

        info!(
            voucher_id = voucher.voucher_id,
            stock = voucher.stock,
            begin = %voucher.begin_time,
            end = %voucher.end_time,
            "Seckill voucher published"
        );
        Ok(())
    }

    /// Stock still available for admission, `None` if never published
    pub async fn remaining_stock(&self, voucher_id: VoucherId) -> Result<Option<i64>, StoreError> {
        let key = keys::seckill_voucher(voucher_id);
        match self.store.hget(&key, "stock").await? {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| StoreError::TypeError {
                    key,
                    message: format!("stock is not an integer: {}", raw),
                }),
        }
    }

    /// Whether the user was already admitted for the voucher
    pub async fn is_admitted(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<bool, StoreError> {
        self.store
            .sismember(&keys::seckill_orders(voucher_id), &user_id.to_string())
            .await
    }

    /// Admit one purchase attempt
    ///
    /// On success the order id is returned immediately; the order row is
    /// written later by the consumer.
    pub async fn admit(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<OrderId, AdmissionError> {
        self.admit_at(user_id, voucher_id, Utc::now()).await
    }

    /// Admit as of `now` (sale window check only)
    pub async fn admit_at(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
        now: DateTime<Utc>,
    ) -> Result<OrderId, AdmissionError> {
        let timer = self.metrics.admission_duration.start_timer();
        let result = self.try_admit(user_id, voucher_id, now).await;
        timer.observe_duration();

        let outcome = match &result {
            Ok(_) => "ELIGIBLE",
            Err(e) => e.code(),
        };
        self.metrics.admissions.with_label_values(&[outcome]).inc();
        result
    }

    async fn try_admit(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
        now: DateTime<Utc>,
    ) -> Result<OrderId, AdmissionError> {
        let code = self
            .store
            .eval_admission(
                &keys::seckill_voucher(voucher_id),
                &keys::seckill_orders(voucher_id),
                &user_id.to_string(),
                now.timestamp_millis(),
            )
            .await?;

        match code {
            AdmissionCode::Eligible => {},
            AdmissionCode::OutOfStock => return Err(AdmissionError::OutOfStock),
            AdmissionCode::DuplicateOrder => return Err(AdmissionError::DuplicateOrder),
            AdmissionCode::NotStarted => return Err(AdmissionError::NotStarted),
            AdmissionCode::Ended => return Err(AdmissionError::Ended),
            AdmissionCode::UnknownVoucher => {
                return Err(AdmissionError::UnknownVoucher(voucher_id))
            },
        }

        // From here on the unit is taken in the shared store
        let order_id = match self.ids.next_id(&self.id_prefix).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    voucher_id,
                    user_id,
                    error = %e,
                    "Stock taken but order id allocation failed; reconcile voucher stock"
                );
                return Err(e.into());
            },
        };

        let task = OrderTask::new(order_id, user_id, voucher_id);
        self.metrics.queue_depth.inc();
        match self.queue.try_send(task) {
            Ok(()) => {
                debug!(voucher_id, user_id, order_id, "Order admitted");
                Ok(order_id)
            },
            Err(e) => {
                self.metrics.queue_depth.dec();
                let reason = match e {
                    TrySendError::Full(_) => "full",
                    TrySendError::Closed(_) => "closed",
                };
                error!(
                    voucher_id,
                    user_id,
                    order_id,
                    reason,
                    "Order queue rejected admitted task; reconcile voucher stock"
                );
                Err(AdmissionError::SystemBusy)
            },
        }
    }
}
