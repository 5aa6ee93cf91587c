//! Cache resilience under concurrent load
//!
//! # Test Coverage
//!
//! 1. **Penetration** - repeated lookups of a missing id reach the loader once
//! 2. **Breakdown (mutex)** - a cold hot key is loaded once under contention
//! 3. **Breakdown (logical)** - stale reads never wait and rebuild once
//! 4. **Namespace isolation** - strategies do not leak between namespaces

use seckill_core::cache::{CacheClient, CacheNamespace, CacheStrategy, LogicalEntry};
use seckill_core::engine::{InMemorySharedStore, SharedStore};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
    score: u32,
}

fn shop(id: u64, name: &str) -> Shop {
    Shop {
        id,
        name: name.to_string(),
        score: 45,
    }
}

fn client_with(namespaces: Vec<CacheNamespace>) -> (Arc<InMemorySharedStore>, Arc<CacheClient>) {
    let store = Arc::new(InMemorySharedStore::new());
    let client = CacheClient::new(store.clone(), 10);
    for ns in namespaces {
        client.register(ns).unwrap();
    }
    (store, Arc::new(client))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_id_reaches_loader_once() {
    let (_, client) = client_with(vec![CacheNamespace::new("shop", CacheStrategy::PassThrough)]);
    let loads = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let loads = loads.clone();
        let found: Option<Shop> = client
            .get("shop", 999, move || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(None)
            })
            .await
            .unwrap();
        assert!(found.is_none());
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutex_hot_key_loaded_once() {
    let ns = CacheNamespace::new("shop", CacheStrategy::Mutex)
        .retries(Duration::from_millis(10), 200);
    let (_, client) = client_with(vec![ns]);
    let loads = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let client = client.clone();
            let loads = loads.clone();
            tokio::spawn(async move {
                client
                    .get("shop", 1, move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, Infallible>(Some(shop(1, "Hot Pot")))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Some(shop(1, "Hot Pot")));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutex_missing_hot_key_caches_null() {
    let ns = CacheNamespace::new("shop", CacheStrategy::Mutex)
        .retries(Duration::from_millis(10), 200);
    let (store, client) = client_with(vec![ns]);
    let loads = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..30)
        .map(|_| {
            let client = client.clone();
            let loads = loads.clone();
            tokio::spawn(async move {
                client
                    .get("shop", 404, move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<Option<Shop>, Infallible>(None)
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), None);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(store.get("cache:shop:404").await.unwrap().as_deref(), Some(""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_logical_expire_serves_stale_without_waiting() {
    let (store, client) =
        client_with(vec![CacheNamespace::new("shop", CacheStrategy::LogicalExpire)]);
    client
        .set_logical("shop", 1, &shop(1, "Before"), Duration::ZERO)
        .await
        .unwrap();

    let loads = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let client = client.clone();
            let loads = loads.clone();
            tokio::spawn(async move {
                client
                    .get("shop", 1, move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        Ok::<_, Infallible>(Some(shop(1, "After")))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Some(shop(1, "Before")));
    }
    // Readers returned well before the rebuild could have finished
    assert!(started.elapsed() < Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(client.rebuilds_in_flight(), 0);

    let raw = store.get("cache:shop:1").await.unwrap().unwrap();
    let entry: LogicalEntry<Shop> = serde_json::from_str(&raw).unwrap();
    assert_eq!(entry.data.name, "After");
    assert!(entry.is_fresh());
    // Build lock released
    assert_eq!(store.get("lock:shop:1").await.unwrap(), None);
}

#[tokio::test]
async fn test_fresh_logical_entry_skips_loader() {
    let (_, client) =
        client_with(vec![CacheNamespace::new("shop", CacheStrategy::LogicalExpire)]);
    client
        .set_logical("shop", 1, &shop(1, "Warm"), Duration::from_secs(60))
        .await
        .unwrap();

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let found = client
        .get("shop", 1, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(None::<Shop>)
        })
        .await
        .unwrap();
    assert_eq!(found, Some(shop(1, "Warm")));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_namespaces_are_independent() {
    let (store, client) = client_with(vec![
        CacheNamespace::new("shop", CacheStrategy::LogicalExpire),
        CacheNamespace::new("shop-type", CacheStrategy::PassThrough),
    ]);

    client.set("shop", 1, &shop(1, "Logical")).await.unwrap();
    client
        .set("shop-type", 1, &vec!["food".to_string()])
        .await
        .unwrap();

    let shop_raw = store.get("cache:shop:1").await.unwrap().unwrap();
    assert!(shop_raw.contains("expire_at"));
    let type_raw = store.get("cache:shop-type:1").await.unwrap().unwrap();
    assert_eq!(type_raw, r#"["food"]"#);
}
