//! Asynchronous order persistence
//!
//! Workers share one receiver. Each task runs under the per-user lock
//! `lock:order:{user_id}`:
//!
//! ```text
//! try_lock ──busy──► skip (LOCK_UNAVAILABLE)
//!    │
//! find_order ──exists──► skip
//!    │
//! create_order ──stock 0──► drop
//!    │        └──err──► drop (PERSIST_FAILURE)
//!    │
//! unlock (always)
//! ```
//!
//! `create_order` decrements ledger stock and inserts the row in one
//! transaction, so a dropped task never leaves a decrement behind.
//!
//! Nothing is retried; every skip or drop is logged with the task ids and
//! counted in `seckill_orders_total`.

use crate::engine::traits::OrderLedger;
use crate::error::{Error, LedgerError};
use crate::keys;
use crate::lock::LockManager;
use crate::metrics::SeckillMetrics;
use crate::types::{OrderTask, VoucherOrder};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Row written and ledger stock decremented
    Persisted,
    /// Another worker holds the user's lock
    LockUnavailable,
    /// The user already has an order for the voucher
    AlreadyExists,
    /// Ledger stock was already zero
    StockExhausted,
    /// Store or ledger failure
    PersistFailure,
}

impl OrderOutcome {
    /// Label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            OrderOutcome::Persisted => "persisted",
            OrderOutcome::LockUnavailable => "lock_unavailable",
            OrderOutcome::AlreadyExists => "already_exists",
            OrderOutcome::StockExhausted => "stock_exhausted",
            OrderOutcome::PersistFailure => "persist_failure",
        }
    }
}

/// Back half of the pipeline
pub struct OrderConsumer {
    ledger: Arc<dyn OrderLedger>,
    locks: Arc<LockManager>,
    metrics: Arc<SeckillMetrics>,
    lock_ttl: Duration,
}

impl OrderConsumer {
    /// Create a consumer
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        locks: Arc<LockManager>,
        metrics: Arc<SeckillMetrics>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            locks,
            metrics,
            lock_ttl,
        }
    }

    /// Persist one task
    pub async fn process(&self, task: OrderTask) -> OrderOutcome {
        let outcome = match self.persist(&task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    order_id = task.order_id,
                    user_id = task.user_id,
                    voucher_id = task.voucher_id,
                    error = %e,
                    "Order dropped"
                );
                OrderOutcome::PersistFailure
            },
        };

        self.metrics
            .orders
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn persist(&self, task: &OrderTask) -> Result<OrderOutcome, Error> {
        let resource = keys::order_lock_resource(task.user_id);
        let Some(handle) = self.locks.try_lock(&resource, self.lock_ttl).await? else {
            warn!(
                order_id = task.order_id,
                user_id = task.user_id,
                "User lock unavailable, skipping order"
            );
            return Ok(OrderOutcome::LockUnavailable);
        };

        let result = self.persist_locked(task).await;

        if let Err(e) = self.locks.unlock(&handle).await {
            warn!(key = %handle.resource_key(), error = %e, "Failed to release order lock");
        }
        Ok(result?)
    }

    async fn persist_locked(&self, task: &OrderTask) -> Result<OrderOutcome, LedgerError> {
        if let Some(existing) = self
            .ledger
            .find_order(task.user_id, task.voucher_id)
            .await?
        {
            warn!(
                order_id = task.order_id,
                existing_order_id = existing.order_id,
                user_id = task.user_id,
                voucher_id = task.voucher_id,
                "Order already persisted, skipping"
            );
            return Ok(OrderOutcome::AlreadyExists);
        }

        match self.ledger.create_order(&VoucherOrder::from_task(task)).await {
            Ok(true) => {
                debug!(
                    order_id = task.order_id,
                    user_id = task.user_id,
                    voucher_id = task.voucher_id,
                    "Order persisted"
                );
                Ok(OrderOutcome::Persisted)
            },
            Ok(false) => {
                error!(
                    order_id = task.order_id,
                    user_id = task.user_id,
                    voucher_id = task.voucher_id,
                    "Ledger stock exhausted for admitted order"
                );
                Ok(OrderOutcome::StockExhausted)
            },
            Err(LedgerError::DuplicateOrder { .. }) => {
                warn!(
                    order_id = task.order_id,
                    user_id = task.user_id,
                    "Order row already exists"
                );
                Ok(OrderOutcome::AlreadyExists)
            },
            Err(e) => Err(e),
        }
    }

    /// Start `workers` tasks draining `receiver`
    ///
    /// On a shutdown signal the queue is closed to new tasks, whatever is
    /// already buffered is persisted, and the workers exit.
    pub fn spawn_workers(
        self: &Arc<Self>,
        receiver: mpsc::Receiver<OrderTask>,
        workers: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let receiver = Arc::new(Mutex::new(receiver));
        (0..workers.max(1))
            .map(|worker_id| {
                let consumer = Arc::clone(self);
                let receiver = receiver.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { consumer.run(worker_id, receiver, shutdown).await })
            })
            .collect()
    }

    async fn run(
        &self,
        worker_id: usize,
        receiver: Arc<Mutex<mpsc::Receiver<OrderTask>>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!(worker_id, "Order worker started");
        let mut draining = false;

        loop {
            let next = {
                let mut rx = receiver.lock().await;
                if draining {
                    rx.recv().await
                } else {
                    tokio::select! {
                        task = rx.recv() => task,
                        _ = shutdown.recv() => {
                            rx.close();
                            draining = true;
                            continue;
                        }
                    }
                }
            };

            match next {
                Some(task) => {
                    self.metrics.queue_depth.dec();
                    self.process(task).await;
                },
                None => break,
            }
        }

        info!(worker_id, "Order worker stopped");
    }
}
