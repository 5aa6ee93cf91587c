//! Wiring of admission, queue, consumer workers and cache

use super::admission::{AdmissionController, ORDER_ID_PREFIX};
use super::consumer::OrderConsumer;
use crate::cache::{CacheClient, CacheNamespace};
use crate::config::Config;
use crate::engine::traits::{OrderLedger, SharedStore};
use crate::error::{AdmissionError, Result, StoreError};
use crate::idgen::IdGenerator;
use crate::keys;
use crate::lock::LockManager;
use crate::metrics::SeckillMetrics;
use crate::types::{OrderId, OrderStatus, SeckillVoucher, UserId, VoucherId};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Builder for [`SeckillPipeline`]
pub struct SeckillPipelineBuilder {
    store: Arc<dyn SharedStore>,
    ledger: Arc<dyn OrderLedger>,
    queue_capacity: usize,
    workers: usize,
    order_id_prefix: String,
    order_lock_ttl: Duration,
    rebuild_pool_size: usize,
    namespaces: Vec<CacheNamespace>,
    shutdown_timeout: Duration,
    metrics: Option<Arc<SeckillMetrics>>,
}

impl SeckillPipelineBuilder {
    fn new(store: Arc<dyn SharedStore>, ledger: Arc<dyn OrderLedger>) -> Self {
        let defaults = Config::default();
        Self {
            store,
            ledger,
            queue_capacity: defaults.seckill.queue_capacity,
            workers: defaults.seckill.workers,
            order_id_prefix: ORDER_ID_PREFIX.to_string(),
            order_lock_ttl: defaults.lock.order_lock_ttl(),
            rebuild_pool_size: defaults.cache.rebuild_pool_size,
            namespaces: Vec::new(),
            shutdown_timeout: defaults.seckill.shutdown_timeout(),
            metrics: None,
        }
    }

    /// Take every setting from a loaded config
    pub fn config(mut self, config: &Config) -> Self {
        self.queue_capacity = config.seckill.queue_capacity;
        self.workers = config.seckill.workers;
        self.order_id_prefix = config.seckill.order_id_prefix.clone();
        self.shutdown_timeout = config.seckill.shutdown_timeout();
        self.order_lock_ttl = config.lock.order_lock_ttl();
        self.rebuild_pool_size = config.cache.rebuild_pool_size;
        self.namespaces = config
            .cache
            .namespaces
            .iter()
            .map(|ns| ns.to_namespace())
            .collect();
        self
    }

    /// Order queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Number of consumer workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Prefix of the order id counter
    pub fn order_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.order_id_prefix = prefix.into();
        self
    }

    /// TTL of the consumer's per-user lock
    pub fn order_lock_ttl(mut self, ttl: Duration) -> Self {
        self.order_lock_ttl = ttl;
        self
    }

    /// Concurrent background cache rebuilds
    pub fn rebuild_pool_size(mut self, size: usize) -> Self {
        self.rebuild_pool_size = size;
        self
    }

    /// Register a cache namespace
    pub fn namespace(mut self, namespace: CacheNamespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    /// How long [`SeckillPipeline::shutdown`] waits for workers
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Share an existing metrics registry
    pub fn metrics(mut self, metrics: Arc<SeckillMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the pipeline and start the consumer workers
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> Result<SeckillPipeline> {
        let metrics = match self.metrics {
            Some(m) => m,
            None => Arc::new(SeckillMetrics::new()?),
        };

        let locks = Arc::new(LockManager::new(self.store.clone()).with_metrics(metrics.clone()));
        let ids = IdGenerator::new(self.store.clone());

        let cache =
            CacheClient::with_locks(self.store.clone(), locks.clone(), self.rebuild_pool_size)
                .with_metrics(metrics.clone());
        for ns in self.namespaces {
            cache.register(ns)?;
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity.max(1));
        let admission = AdmissionController::new(
            self.store.clone(),
            ids.clone(),
            tx,
            metrics.clone(),
        )
        .with_id_prefix(self.order_id_prefix);

        let consumer = Arc::new(OrderConsumer::new(
            self.ledger.clone(),
            locks.clone(),
            metrics.clone(),
            self.order_lock_ttl,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let workers = consumer.spawn_workers(rx, self.workers, &shutdown_tx);

        info!(
            store = self.store.store_id(),
            workers = workers.len(),
            queue_capacity = self.queue_capacity,
            "Seckill pipeline started"
        );

        Ok(SeckillPipeline {
            admission: Arc::new(admission),
            cache: Arc::new(cache),
            locks,
            ids,
            store: self.store,
            ledger: self.ledger,
            metrics,
            shutdown_tx,
            workers: Mutex::new(workers),
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

/// Running seckill core
///
/// Admission answers immediately; orders are written by background workers
/// until [`shutdown`](Self::shutdown) drains the queue.
pub struct SeckillPipeline {
    admission: Arc<AdmissionController>,
    cache: Arc<CacheClient>,
    locks: Arc<LockManager>,
    ids: IdGenerator,
    store: Arc<dyn SharedStore>,
    ledger: Arc<dyn OrderLedger>,
    metrics: Arc<SeckillMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl SeckillPipeline {
    /// Start configuring a pipeline over the given backends
    pub fn builder(
        store: Arc<dyn SharedStore>,
        ledger: Arc<dyn OrderLedger>,
    ) -> SeckillPipelineBuilder {
        SeckillPipelineBuilder::new(store, ledger)
    }

    /// Admission controller
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Cache client
    pub fn cache(&self) -> &Arc<CacheClient> {
        &self.cache
    }

    /// Lock manager shared with the consumer
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// ID generator
    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Shared store
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// Metrics registry
    pub fn metrics(&self) -> &Arc<SeckillMetrics> {
        &self.metrics
    }

    /// See [`AdmissionController::admit`]
    pub async fn admit(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> std::result::Result<OrderId, AdmissionError> {
        self.admission.admit(user_id, voucher_id).await
    }

    /// See [`AdmissionController::publish_voucher`]
    pub async fn publish_voucher(
        &self,
        voucher: &SeckillVoucher,
    ) -> std::result::Result<(), StoreError> {
        self.admission.publish_voucher(voucher).await
    }

    /// Where a (user, voucher) order stands
    ///
    /// The ledger is authoritative; an admitted user without a row yet is
    /// still [`OrderStatus::Pending`].
    pub async fn order_status(&self, user_id: UserId, voucher_id: VoucherId) -> Result<OrderStatus> {
        if let Some(order) = self.ledger.find_order(user_id, voucher_id).await? {
            return Ok(OrderStatus::Persisted(order));
        }

        let admitted = self
            .store
            .sismember(&keys::seckill_orders(voucher_id), &user_id.to_string())
            .await?;
        Ok(if admitted {
            OrderStatus::Pending
        } else {
            OrderStatus::NotFound
        })
    }

    /// Whether consumer workers are still running
    pub fn is_running(&self) -> bool {
        self.workers.lock().iter().any(|w| !w.is_finished())
    }

    /// Stop accepting orders, persist what is queued, and stop the workers
    ///
    /// Admissions after this call fail with `SYSTEM_BUSY`. Returns the number
    /// of workers that did not finish within the shutdown timeout.
    pub async fn shutdown(&self) -> usize {
        info!("Initiating seckill pipeline shutdown");
        let _ = self.shutdown_tx.send(());

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let deadline = Instant::now() + self.shutdown_timeout;
        let mut unfinished = 0;

        for (worker_id, worker) in workers.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, worker).await {
                Ok(Ok(())) => debug!(worker_id, "Worker stopped"),
                Ok(Err(e)) => warn!(worker_id, error = %e, "Worker panicked"),
                Err(_) => {
                    warn!(worker_id, "Worker did not drain before shutdown timeout");
                    unfinished += 1;
                },
            }
        }

        info!(
            queued = self.metrics.queue_depth.get(),
            unfinished, "Seckill pipeline stopped"
        );
        unfinished
    }
}
