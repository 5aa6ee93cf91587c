//! Prometheus metrics for the seckill pipeline
//!
//! Every collector is registered on a registry owned by [`SeckillMetrics`]
//! rather than the process-global default, so two pipelines in one process
//! (or two tests) never collide.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Collectors shared by the admission controller, consumer and cache client
pub struct SeckillMetrics {
    registry: Registry,

    /// Admission requests by outcome code (ELIGIBLE, OUT_OF_STOCK, ...)
    pub admissions: IntCounterVec,

    /// Admission latency in seconds
    pub admission_duration: Histogram,

    /// Consumer results by outcome (persisted, lock_unavailable, already_exists, ...)
    pub orders: IntCounterVec,

    /// Tasks currently queued between admission and the consumer
    pub queue_depth: IntGauge,

    /// Cache lookups by namespace and result (hit, null_hit, miss, stale)
    pub cache_lookups: IntCounterVec,

    /// Cache rebuilds by namespace and strategy
    pub cache_rebuilds: IntCounterVec,

    /// Lock attempts by result (acquired, busy)
    pub lock_attempts: IntCounterVec,
}

impl SeckillMetrics {
    /// Create and register all collectors on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let admissions = IntCounterVec::new(
            Opts::new("seckill_admissions_total", "Admission requests by outcome"),
            &["outcome"],
        )?;
        let admission_duration = Histogram::with_opts(
            HistogramOpts::new(
                "seckill_admission_duration_seconds",
                "Admission latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        let orders = IntCounterVec::new(
            Opts::new("seckill_orders_total", "Consumer results by outcome"),
            &["outcome"],
        )?;
        let queue_depth = IntGauge::new("seckill_queue_depth", "Queued order tasks")?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("seckill_cache_lookups_total", "Cache lookups by result"),
            &["namespace", "result"],
        )?;
        let cache_rebuilds = IntCounterVec::new(
            Opts::new("seckill_cache_rebuilds_total", "Cache rebuilds"),
            &["namespace", "strategy"],
        )?;
        let lock_attempts = IntCounterVec::new(
            Opts::new("seckill_lock_attempts_total", "Lock attempts by result"),
            &["result"],
        )?;

        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(admission_duration.clone()))?;
        registry.register(Box::new(orders.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(cache_rebuilds.clone()))?;
        registry.register(Box::new(lock_attempts.clone()))?;

        Ok(Self {
            registry,
            admissions,
            admission_duration,
            orders,
            queue_depth,
            cache_lookups,
            cache_rebuilds,
            lock_attempts,
        })
    }

    /// Current value of an admission outcome counter
    pub fn admission_count(&self, outcome: &str) -> u64 {
        self.admissions.with_label_values(&[outcome]).get()
    }

    /// Current value of a consumer outcome counter
    pub fn order_count(&self, outcome: &str) -> u64 {
        self.orders.with_label_values(&[outcome]).get()
    }

    /// Render all collectors in the Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
