//! Cache client dispatching on the namespace strategy

use super::entry::{decode, encode, LogicalEntry, NULL_SENTINEL};
use super::{CacheNamespace, CacheStrategy};
use crate::engine::traits::SharedStore;
use crate::error::CacheError;
use crate::keys;
use crate::lock::{LockHandle, LockManager};
use crate::metrics::SeckillMetrics;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Raw state of a cache key
enum Lookup {
    Absent,
    Null,
    Value(String),
}

async fn read(store: &dyn SharedStore, key: &str) -> Result<Lookup, CacheError> {
    Ok(match store.get(key).await? {
        None => Lookup::Absent,
        Some(raw) if raw == NULL_SENTINEL => Lookup::Null,
        Some(raw) => Lookup::Value(raw),
    })
}

/// Decoded value if the key holds one, `Some(None)` for the null sentinel
async fn peek<T: DeserializeOwned>(
    store: &dyn SharedStore,
    key: &str,
    logical: bool,
) -> Result<Option<Option<T>>, CacheError> {
    match read(store, key).await? {
        Lookup::Absent => Ok(None),
        Lookup::Null => Ok(Some(None)),
        Lookup::Value(raw) if logical => {
            let entry: LogicalEntry<T> = decode(key, &raw)?;
            Ok(Some(Some(entry.data)))
        },
        Lookup::Value(raw) => Ok(Some(Some(decode(key, &raw)?))),
    }
}

/// Encode a loader result in the namespace's format, with its physical TTL
fn render<T: Serialize>(
    ns: &CacheNamespace,
    key: &str,
    value: Option<&T>,
    logical: bool,
) -> Result<(String, Option<Duration>), CacheError> {
    Ok(match value {
        None => (NULL_SENTINEL.to_string(), Some(ns.null_ttl)),
        Some(v) if logical => (
            encode(key, &LogicalEntry::expiring_in(v, ns.logical_ttl))?,
            None,
        ),
        Some(v) => (encode(key, v)?, Some(ns.ttl)),
    })
}

/// Write an entry produced by [`render`]
async fn populate(
    store: &dyn SharedStore,
    key: &str,
    (raw, ttl): (String, Option<Duration>),
) -> Result<(), CacheError> {
    store.set(key, &raw, ttl).await?;
    Ok(())
}

async fn release(locks: &LockManager, handle: &LockHandle) {
    if let Err(e) = locks.unlock(handle).await {
        warn!(key = %handle.resource_key(), error = %e, "Failed to release build lock");
    }
}

fn count_rebuild(metrics: Option<&SeckillMetrics>, ns: &CacheNamespace) {
    if let Some(m) = metrics {
        m.cache_rebuilds
            .with_label_values(&[ns.name.as_str(), ns.strategy.as_str()])
            .inc();
    }
}

/// Read-through cache over a [`SharedStore`]
///
/// Cheap to share behind an `Arc`; namespaces can be registered at any time.
pub struct CacheClient {
    store: Arc<dyn SharedStore>,
    locks: Arc<LockManager>,
    namespaces: RwLock<HashMap<String, CacheNamespace>>,
    rebuild_permits: Arc<Semaphore>,
    rebuild_pool_size: usize,
    metrics: Option<Arc<SeckillMetrics>>,
}

impl CacheClient {
    /// Create a client whose background rebuilds run at most
    /// `rebuild_pool_size` at a time
    pub fn new(store: Arc<dyn SharedStore>, rebuild_pool_size: usize) -> Self {
        let locks = Arc::new(LockManager::new(store.clone()));
        Self::with_locks(store, locks, rebuild_pool_size)
    }

    /// Like [`CacheClient::new`], taking build locks through `locks`
    pub fn with_locks(
        store: Arc<dyn SharedStore>,
        locks: Arc<LockManager>,
        rebuild_pool_size: usize,
    ) -> Self {
        let pool = rebuild_pool_size.max(1);
        Self {
            locks,
            store,
            namespaces: RwLock::new(HashMap::new()),
            rebuild_permits: Arc::new(Semaphore::new(pool)),
            rebuild_pool_size: pool,
            metrics: None,
        }
    }

    /// Record lookups and rebuilds
    pub fn with_metrics(mut self, metrics: Arc<SeckillMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register or replace a namespace
    ///
    /// `order` is refused: its build locks would share keys with the
    /// consumer's per-user order locks.
    pub fn register(&self, namespace: CacheNamespace) -> Result<(), CacheError> {
        if keys::is_reserved_cache_namespace(&namespace.name) {
            return Err(CacheError::ReservedNamespace(namespace.name));
        }
        debug!(
            namespace = %namespace.name,
            strategy = %namespace.strategy,
            "Registered cache namespace"
        );
        self.namespaces
            .write()
            .insert(namespace.name.clone(), namespace);
        Ok(())
    }

    /// Settings of a registered namespace
    pub fn namespace(&self, name: &str) -> Result<CacheNamespace, CacheError> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownNamespace(name.to_string()))
    }

    /// Background rebuilds currently holding a pool slot
    pub fn rebuilds_in_flight(&self) -> usize {
        self.rebuild_pool_size - self.rebuild_permits.available_permits()
    }

    fn lookup(&self, ns: &CacheNamespace, result: &str) {
        if let Some(m) = &self.metrics {
            m.cache_lookups
                .with_label_values(&[ns.name.as_str(), result])
                .inc();
        }
    }

    /// Look up `id` in `namespace`, loading from the source of record on miss
    ///
    /// `Ok(None)` means the source reported the entity as not found, either
    /// now or within the null sentinel's TTL.
    pub async fn get<T, F, Fut, E>(
        &self,
        namespace: &str,
        id: impl Display,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let ns = self.namespace(namespace)?;
        let key = keys::cache(&ns.name, &id);
        let build = keys::cache_build_resource(&ns.name, &id);

        match ns.strategy {
            CacheStrategy::PassThrough => self.get_pass_through(&ns, &key, loader).await,
            CacheStrategy::Mutex => {
                if let Some(found) = self.peek_counted(&ns, &key, false).await? {
                    return Ok(found);
                }
                self.load_with_mutex(&ns, &key, &build, loader, false).await
            },
            CacheStrategy::LogicalExpire => self.get_logical(&ns, &key, &build, loader).await,
        }
    }

    async fn peek_counted<T: DeserializeOwned>(
        &self,
        ns: &CacheNamespace,
        key: &str,
        logical: bool,
    ) -> Result<Option<Option<T>>, CacheError> {
        let found = peek(&*self.store, key, logical).await?;
        match &found {
            None => self.lookup(ns, "miss"),
            Some(None) => self.lookup(ns, "null_hit"),
            Some(Some(_)) => self.lookup(ns, "hit"),
        }
        Ok(found)
    }

    async fn get_pass_through<T, F, Fut, E>(
        &self,
        ns: &CacheNamespace,
        key: &str,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        if let Some(found) = self.peek_counted(ns, key, false).await? {
            return Ok(found);
        }

        let loaded = loader()
            .await
            .map_err(|e| CacheError::Loader(e.to_string()))?;
        let rendered = render(ns, key, loaded.as_ref(), false)?;
        populate(&*self.store, key, rendered).await?;
        count_rebuild(self.metrics.as_deref(), ns);
        debug!(key = %key, found = loaded.is_some(), "Cache populated");
        Ok(loaded)
    }

    /// Single loader behind the build lock; everyone else sleeps and re-reads
    async fn load_with_mutex<T, F, Fut, E>(
        &self,
        ns: &CacheNamespace,
        key: &str,
        build: &str,
        loader: F,
        logical: bool,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(handle) = self.locks.try_lock(build, ns.lock_ttl).await? {
                let result = self.rebuild_locked(ns, key, loader, logical).await;
                release(&self.locks, &handle).await;
                return result;
            }

            if attempts >= ns.max_retries {
                warn!(key = %key, attempts, "Gave up waiting for cache rebuild");
                return Err(CacheError::RebuildContention {
                    key: key.to_string(),
                    attempts,
                });
            }

            tokio::time::sleep(ns.retry_delay).await;
            if let Some(found) = peek(&*self.store, key, logical).await? {
                return Ok(found);
            }
        }
    }

    async fn rebuild_locked<T, F, Fut, E>(
        &self,
        ns: &CacheNamespace,
        key: &str,
        loader: F,
        logical: bool,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        // Another holder may have finished between our miss and the lock
        if let Some(found) = peek(&*self.store, key, logical).await? {
            return Ok(found);
        }

        let loaded = loader()
            .await
            .map_err(|e| CacheError::Loader(e.to_string()))?;
        let rendered = render(ns, key, loaded.as_ref(), logical)?;
        populate(&*self.store, key, rendered).await?;
        count_rebuild(self.metrics.as_deref(), ns);
        debug!(key = %key, found = loaded.is_some(), "Cache rebuilt under lock");
        Ok(loaded)
    }

    async fn get_logical<T, F, Fut, E>(
        &self,
        ns: &CacheNamespace,
        key: &str,
        build: &str,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let raw = match read(&*self.store, key).await? {
            Lookup::Absent => {
                self.lookup(ns, "miss");
                return self.load_with_mutex(ns, key, build, loader, true).await;
            },
            Lookup::Null => {
                self.lookup(ns, "null_hit");
                return Ok(None);
            },
            Lookup::Value(raw) => raw,
        };

        let entry: LogicalEntry<T> = decode(key, &raw)?;
        if entry.is_fresh() {
            self.lookup(ns, "hit");
            return Ok(Some(entry.data));
        }

        self.lookup(ns, "stale");
        if let Some(handle) = self.locks.try_lock(build, ns.lock_ttl).await? {
            self.spawn_rebuild(ns.clone(), key.to_string(), handle, loader);
        }
        Ok(Some(entry.data))
    }

    fn spawn_rebuild<T, F, Fut, E>(
        &self,
        ns: CacheNamespace,
        key: String,
        handle: LockHandle,
        loader: F,
    ) where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let store = self.store.clone();
        let locks = self.locks.clone();
        let permits = self.rebuild_permits.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                release(&locks, &handle).await;
                return;
            };

            let fresh = match read(&*store, &key).await {
                Ok(Lookup::Value(raw)) => decode::<LogicalEntry<T>>(&key, &raw)
                    .map(|e| e.is_fresh())
                    .unwrap_or(false),
                _ => false,
            };

            if !fresh {
                match loader().await {
                    Ok(loaded) => {
                        let rendered = render(&ns, &key, loaded.as_ref(), true);
                        let written = match rendered {
                            Ok(rendered) => populate(&*store, &key, rendered).await,
                            Err(e) => Err(e),
                        };
                        match written {
                            Ok(()) => {
                                count_rebuild(metrics.as_deref(), &ns);
                                debug!(key = %key, "Logical cache entry rebuilt");
                            },
                            Err(e) => error!(key = %key, error = %e, "Failed to write rebuilt entry"),
                        }
                    },
                    Err(e) => error!(key = %key, error = %e, "Cache rebuild loader failed"),
                }
            }

            release(&locks, &handle).await;
        });
    }

    /// Write `value` in the namespace's native format
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        id: impl Display,
        value: &T,
    ) -> Result<(), CacheError> {
        let ns = self.namespace(namespace)?;
        let key = keys::cache(&ns.name, &id);
        let logical = ns.strategy == CacheStrategy::LogicalExpire;
        let rendered = render(&ns, &key, Some(value), logical)?;
        populate(&*self.store, &key, rendered).await
    }

    /// Warm a logical entry that expires `ttl` from now
    ///
    /// Hot keys under `LogicalExpire` are normally seeded this way ahead of
    /// traffic.
    pub async fn set_logical<T: Serialize>(
        &self,
        namespace: &str,
        id: impl Display,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ns = self.namespace(namespace)?;
        let key = keys::cache(&ns.name, &id);
        let raw = encode(&key, &LogicalEntry::expiring_in(value, ttl))?;
        self.store.set(&key, &raw, None).await?;
        Ok(())
    }

    /// Drop the cached entry after the source of record was updated
    pub async fn invalidate(&self, namespace: &str, id: impl Display) -> Result<bool, CacheError> {
        let ns = self.namespace(namespace)?;
        let key = keys::cache(&ns.name, &id);
        let removed = self.store.delete(&key).await?;
        debug!(key = %key, removed, "Cache entry invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stubs::InMemorySharedStore;
    use serde::Deserialize;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    fn shop(id: u64, name: &str) -> Shop {
        Shop {
            id,
            name: name.to_string(),
        }
    }

    fn client(ns: CacheNamespace) -> (Arc<InMemorySharedStore>, CacheClient) {
        let store = Arc::new(InMemorySharedStore::new());
        let client = CacheClient::new(store.clone(), 4);
        client.register(ns).unwrap();
        (store, client)
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let (_, client) = client(CacheNamespace::new("shop", CacheStrategy::PassThrough));
        let result: Result<Option<Shop>, _> = client
            .get("voucher", 1, || async { Ok::<_, Infallible>(None) })
            .await;
        assert!(matches!(result, Err(CacheError::UnknownNamespace(_))));
    }

    #[test]
    fn test_order_namespace_is_refused() {
        let client = CacheClient::new(Arc::new(InMemorySharedStore::new()), 1);
        let result = client.register(CacheNamespace::new("order", CacheStrategy::Mutex));
        assert!(matches!(result, Err(CacheError::ReservedNamespace(ref n)) if n == "order"));
        assert!(matches!(
            client.namespace("order"),
            Err(CacheError::UnknownNamespace(_))
        ));
    }

    #[tokio::test]
    async fn test_pass_through_caches_value() {
        let (store, client) = client(CacheNamespace::new("shop", CacheStrategy::PassThrough));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let found = client
                .get("shop", 1, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Some(shop(1, "Cafe")))
                })
                .await
                .unwrap();
            assert_eq!(found, Some(shop(1, "Cafe")));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let raw = store.get("cache:shop:1").await.unwrap().unwrap();
        assert_eq!(raw, r#"{"id":1,"name":"Cafe"}"#);
    }

    #[tokio::test]
    async fn test_pass_through_caches_not_found() {
        let (store, client) = client(CacheNamespace::new("shop", CacheStrategy::PassThrough));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let found: Option<Shop> = client
                .get("shop", 404, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(None)
                })
                .await
                .unwrap();
            assert!(found.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("cache:shop:404").await.unwrap().as_deref(),
            Some(NULL_SENTINEL)
        );
    }

    #[tokio::test]
    async fn test_null_sentinel_expires() {
        let (_, client) = client(
            CacheNamespace::new("shop", CacheStrategy::PassThrough)
                .null_ttl(Duration::from_millis(20)),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let _: Option<Shop> = client
                .get("shop", 5, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(None)
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let (store, client) = client(CacheNamespace::new("shop", CacheStrategy::PassThrough));
        let result: Result<Option<Shop>, _> = client
            .get("shop", 1, || async { Err("database down") })
            .await;

        assert!(matches!(result, Err(CacheError::Loader(ref m)) if m == "database down"));
        assert_eq!(store.get("cache:shop:1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutex_single_rebuild() {
        let ns = CacheNamespace::new("shop", CacheStrategy::Mutex)
            .retries(Duration::from_millis(10), 100);
        let (_, client) = client(ns);
        let client = Arc::new(client);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let client = client.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                client
                    .get("shop", 1, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(Some(shop(1, "Cafe")))
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), Some(shop(1, "Cafe")));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutex_gives_up_after_retries() {
        let ns = CacheNamespace::new("shop", CacheStrategy::Mutex)
            .retries(Duration::from_millis(1), 3);
        let (store, client) = client(ns);
        store
            .set_nx("lock:shop:1", "someone-else", Duration::from_secs(5))
            .await
            .unwrap();

        let result: Result<Option<Shop>, _> = client
            .get("shop", 1, || async { Ok::<_, Infallible>(None) })
            .await;
        assert!(matches!(
            result,
            Err(CacheError::RebuildContention { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_logical_cold_miss_writes_envelope() {
        let (store, client) = client(CacheNamespace::new("shop", CacheStrategy::LogicalExpire));

        let found = client
            .get("shop", 2, || async {
                Ok::<_, Infallible>(Some(shop(2, "Bakery")))
            })
            .await
            .unwrap();
        assert_eq!(found, Some(shop(2, "Bakery")));

        let raw = store.get("cache:shop:2").await.unwrap().unwrap();
        let entry: LogicalEntry<Shop> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry.data, shop(2, "Bakery"));
        assert!(entry.is_fresh());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_logical_stale_serves_old_and_rebuilds_once() {
        let (_, client) = client(CacheNamespace::new("shop", CacheStrategy::LogicalExpire));
        let client = Arc::new(client);
        client
            .set_logical("shop", 1, &shop(1, "old"), Duration::ZERO)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let client = client.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                client
                    .get("shop", 1, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, Infallible>(Some(shop(1, "new")))
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), Some(shop(1, "old")));
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let refreshed: Option<Shop> = client
            .get("shop", 1, || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert_eq!(refreshed, Some(shop(1, "new")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_logical_get_from_spawned_task_with_unshared_value() {
        // Cell is Send but not Sync; the rebuild task must only need Send
        let (_, client) = client(CacheNamespace::new("counter", CacheStrategy::LogicalExpire));
        let client = Arc::new(client);
        client
            .set_logical("counter", 1, &Cell::new(1u32), Duration::ZERO)
            .await
            .unwrap();

        let reader = client.clone();
        let stale = tokio::spawn(async move {
            reader
                .get("counter", 1, || async { Ok::<_, Infallible>(Some(Cell::new(2u32))) })
                .await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stale.map(|c| c.get()), Some(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let fresh: Option<Cell<u32>> = client
            .get("counter", 1, || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert_eq!(fresh.map(|c| c.get()), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_and_set() {
        let (_, client) = client(CacheNamespace::new("shop", CacheStrategy::PassThrough));
        client.set("shop", 3, &shop(3, "Bar")).await.unwrap();

        let cached: Option<Shop> = client
            .get("shop", 3, || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert_eq!(cached, Some(shop(3, "Bar")));

        assert!(client.invalidate("shop", 3).await.unwrap());
        assert!(!client.invalidate("shop", 3).await.unwrap());

        let reloaded = client
            .get("shop", 3, || async {
                Ok::<_, Infallible>(Some(shop(3, "Bar & Grill")))
            })
            .await
            .unwrap();
        assert_eq!(reloaded, Some(shop(3, "Bar & Grill")));
    }

    #[tokio::test]
    async fn test_lookup_metrics() {
        let store = Arc::new(InMemorySharedStore::new());
        let metrics = Arc::new(SeckillMetrics::new().unwrap());
        let client = CacheClient::new(store, 2).with_metrics(metrics.clone());
        client
            .register(CacheNamespace::new("shop-type", CacheStrategy::PassThrough))
            .unwrap();

        for _ in 0..2 {
            let _: Option<Vec<String>> = client
                .get("shop-type", 1, || async {
                    Ok::<_, Infallible>(Some(vec!["food".to_string()]))
                })
                .await
                .unwrap();
        }

        let hits = metrics
            .cache_lookups
            .with_label_values(&["shop-type", "hit"])
            .get();
        let misses = metrics
            .cache_lookups
            .with_label_values(&["shop-type", "miss"])
            .get();
        assert_eq!((hits, misses), (1, 1));
        assert_eq!(
            metrics
                .cache_rebuilds
                .with_label_values(&["shop-type", "pass_through"])
                .get(),
            1
        );
    }
}
