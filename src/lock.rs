//! Distributed mutual-exclusion lock over the shared store
//!
//! A lock is a single string key `lock:{resource}` holding the owner's token,
//! written with `SET NX PX`. Acquisition is one non-blocking attempt; the TTL
//! is the only guarantee that a crashed holder eventually lets go.
//!
//! Release and renewal go through compare-and-act scripts so a holder whose
//! lock already expired (and was taken by someone else) can never delete or
//! extend the new owner's lock.
//!
//! # Tokens
//!
//! Each [`LockManager`] draws a UUID at construction and appends a sequence
//! number per acquisition, so tokens are unique across processes and across
//! tasks within one process.
//!
//! # Watchdog
//!
//! [`LockManager::try_lock_with_watchdog`] attaches a background task that
//! re-extends the TTL every `ttl / 3` while the handle is alive. The task stops
//! on [`LockManager::unlock`], when the handle is dropped, or when a renewal
//! reports the lock is no longer ours.

use crate::engine::traits::SharedStore;
use crate::error::StoreError;
use crate::keys;
use crate::metrics::SeckillMetrics;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Floor for the watchdog renewal interval
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Proof of a successful acquisition
#[derive(Debug)]
pub struct LockHandle {
    resource_key: String,
    holder_token: String,
    ttl: Duration,
    watchdog: Option<Watchdog>,
}

impl LockHandle {
    /// Full store key of the lock (`lock:{resource}`)
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    /// Token written into the lock key
    pub fn holder_token(&self) -> &str {
        &self.holder_token
    }

    /// TTL requested at acquisition
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether a renewal task is attached and still running
    pub fn has_watchdog(&self) -> bool {
        self.watchdog
            .as_ref()
            .map(|w| !w.task.is_finished())
            .unwrap_or(false)
    }
}

/// Background TTL renewal attached to a handle
#[derive(Debug)]
struct Watchdog {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Watchdog {
    fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
        self.task.abort();
    }
}

/// Issues and releases locks against a [`SharedStore`]
pub struct LockManager {
    store: Arc<dyn SharedStore>,
    process_id: String,
    sequence: AtomicU64,
    metrics: Option<Arc<SeckillMetrics>>,
}

impl LockManager {
    /// Create a manager with a fresh process identity
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            process_id: Uuid::new_v4().simple().to_string(),
            sequence: AtomicU64::new(0),
            metrics: None,
        }
    }

    /// Count attempts in `lock_attempts`
    pub fn with_metrics(mut self, metrics: Arc<SeckillMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process identity embedded in every token
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    fn next_token(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.process_id, seq)
    }

    fn record(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.lock_attempts.with_label_values(&[result]).inc();
        }
    }

    /// Single non-blocking acquisition attempt
    ///
    /// Returns `Ok(None)` when another holder owns the resource.
    pub async fn try_lock(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<LockHandle>, StoreError> {
        let key = keys::lock(resource);
        let token = self.next_token();

        if self.store.set_nx(&key, &token, ttl).await? {
            self.record("acquired");
            debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            Ok(Some(LockHandle {
                resource_key: key,
                holder_token: token,
                ttl,
                watchdog: None,
            }))
        } else {
            self.record("busy");
            debug!(key = %key, "Lock busy");
            Ok(None)
        }
    }

    /// Acquire and keep the lock alive until unlocked or dropped
    pub async fn try_lock_with_watchdog(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<LockHandle>, StoreError> {
        let Some(mut handle) = self.try_lock(resource, ttl).await? else {
            return Ok(None);
        };

        let (stop, mut stopped) = watch::channel(false);
        let store = self.store.clone();
        let key = handle.resource_key.clone();
        let token = handle.holder_token.clone();
        let interval = (ttl / 3).max(MIN_RENEW_INTERVAL);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        match store.renew_lock(&key, &token, ttl).await {
                            Ok(true) => debug!(key = %key, "Lock renewed"),
                            Ok(false) => {
                                warn!(key = %key, "Lock ownership lost, stopping renewal");
                                break;
                            }
                            Err(e) => warn!(key = %key, error = %e, "Lock renewal failed"),
                        }
                    }
                }
            }
        });

        handle.watchdog = Some(Watchdog { stop, task });
        Ok(Some(handle))
    }

    /// Extend the TTL if the lock is still ours
    pub async fn renew(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        self.store
            .renew_lock(&handle.resource_key, &handle.holder_token, handle.ttl)
            .await
    }

    /// Release the lock if it still holds our token
    ///
    /// Returns false when the lock had expired or belongs to someone else;
    /// in that case nothing is deleted.
    pub async fn unlock(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        if let Some(watchdog) = &handle.watchdog {
            watchdog.stop();
        }

        let released = self
            .store
            .release_lock(&handle.resource_key, &handle.holder_token)
            .await?;

        if released {
            debug!(key = %handle.resource_key, "Lock released");
        } else {
            warn!(key = %handle.resource_key, "Lock was not held at release");
        }
        Ok(released)
    }
}
