//! In-memory implementations of the external collaborators.
//!
//! These implementations are intended for:
//! - **Unit testing** without a running Redis or database
//! - **Integration testing** of the concurrency properties
//! - **Offline simulation** (`seckill simulate --backend memory`)
//!
//! # Available Stubs
//!
//! ## In-Memory Shared Store ([`InMemorySharedStore`])
//!
//! Keeps every key behind a single mutex, so each trait call (including the
//! admission and lock scripts) is indivisible, the same guarantee Redis gives
//! a Lua script. TTLs are enforced lazily on access.
//!
//! ## In-Memory Ledger ([`InMemoryLedger`])
//!
//! A map of voucher stock and order rows with a unique (user, voucher)
//! constraint. Insert failures can be injected to exercise the consumer's
//! drop path.
//!
//! # Warning
//!
//! Neither stub persists anything or coordinates across processes.

use crate::engine::traits::{AdmissionCode, OrderLedger, SharedStore};
use crate::error::{LedgerError, StoreError};
use crate::types::{UserId, VoucherId, VoucherOrder};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

// =============================================================================
// InMemorySharedStore
// =============================================================================

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Look up a key, evicting it first if its TTL has passed
fn live<'a>(data: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if data.get(key).is_some_and(|e| e.is_expired(now)) {
        data.remove(key);
    }
    data.get_mut(key)
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> StoreError {
    StoreError::TypeError {
        key: key.to_string(),
        message: format!("expected {}, found {}", expected, found.kind()),
    }
}

fn parse_field(key: &str, field: &str, raw: Option<&String>) -> Result<i64, StoreError> {
    raw.and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| StoreError::TypeError {
            key: key.to_string(),
            message: format!("field '{}' is missing or not an integer", field),
        })
}

/// In-memory shared store with Redis-like semantics
#[derive(Debug, Default)]
pub struct InMemorySharedStore {
    data: Mutex<HashMap<String, Entry>>,
    /// Number of trait calls served, for tests asserting round-trips
    commands: AtomicU64,
}

impl InMemorySharedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands served so far
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.lock();
        data.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cardinality of a set key (0 when absent)
    pub fn scard(&self, key: &str) -> usize {
        let mut data = self.data.lock();
        match live(&mut data, key) {
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => s.len(),
            _ => 0,
        }
    }

    fn record(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    fn store_id(&self) -> &str {
        "in-memory-store-v1"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(e) => Err(wrong_type(key, "string", &e.value)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.record();
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.data.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.record();
        let mut data = self.data.lock();
        if live(&mut data, key).is_some() {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.record();
        let mut data = self.data.lock();
        if live(&mut data, key).is_none() {
            return Ok(false);
        }
        Ok(data.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            None => {
                data.insert(key.to_string(), Entry::persistent(Value::Str("1".into())));
                Ok(1)
            },
            Some(entry) => match &mut entry.value {
                Value::Str(s) => {
                    let current = s.parse::<i64>().map_err(|_| StoreError::TypeError {
                        key: key.to_string(),
                        message: "value is not an integer".to_string(),
                    })?;
                    let next = current.checked_add(1).ok_or_else(|| {
                        StoreError::CommandError(format!("increment overflow at {}", key))
                    })?;
                    *s = next.to_string();
                    Ok(next)
                },
                other => Err(wrong_type(key, "string", other)),
            },
        }
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            None => {
                let hash = fields
                    .iter()
                    .map(|(f, v)| (f.to_string(), v.clone()))
                    .collect();
                data.insert(key.to_string(), Entry::persistent(Value::Hash(hash)));
                Ok(())
            },
            Some(entry) => match &mut entry.value {
                Value::Hash(hash) => {
                    for (f, v) in fields {
                        hash.insert(f.to_string(), v.clone());
                    }
                    Ok(())
                },
                other => Err(wrong_type(key, "hash", other)),
            },
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.get(field).cloned()),
            Some(e) => Err(wrong_type(key, "hash", &e.value)),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            None => Ok(false),
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => Ok(s.contains(member)),
            Some(e) => Err(wrong_type(key, "set", &e.value)),
        }
    }

    async fn eval_admission(
        &self,
        voucher_key: &str,
        orders_key: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<AdmissionCode, StoreError> {
        self.record();
        let mut data = self.data.lock();

        let (stock, begin, end) = match live(&mut data, voucher_key) {
            None => return Ok(AdmissionCode::UnknownVoucher),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => (
                parse_field(voucher_key, "stock", h.get("stock"))?,
                parse_field(voucher_key, "begin", h.get("begin"))?,
                parse_field(voucher_key, "end", h.get("end"))?,
            ),
            Some(e) => return Err(wrong_type(voucher_key, "hash", &e.value)),
        };

        if now_ms < begin {
            return Ok(AdmissionCode::NotStarted);
        }
        if now_ms > end {
            return Ok(AdmissionCode::Ended);
        }
        if stock < 1 {
            return Ok(AdmissionCode::OutOfStock);
        }

        match live(&mut data, orders_key) {
            None => {},
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => {
                if s.contains(user_id) {
                    return Ok(AdmissionCode::DuplicateOrder);
                }
            },
            Some(e) => return Err(wrong_type(orders_key, "set", &e.value)),
        }

        if let Some(Entry {
            value: Value::Hash(h),
            ..
        }) = data.get_mut(voucher_key)
        {
            h.insert("stock".to_string(), (stock - 1).to_string());
        }
        match data.get_mut(orders_key) {
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => {
                s.insert(user_id.to_string());
            },
            _ => {
                let mut set = HashSet::new();
                set.insert(user_id.to_string());
                data.insert(orders_key.to_string(), Entry::persistent(Value::Set(set)));
            },
        }

        Ok(AdmissionCode::Eligible)
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        self.record();
        let mut data = self.data.lock();
        let owned = matches!(
            live(&mut data, key),
            Some(Entry { value: Value::Str(s), .. }) if s.as_str() == token
        );
        if owned {
            data.remove(key);
        }
        Ok(owned)
    }

    async fn renew_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.record();
        let mut data = self.data.lock();
        match live(&mut data, key) {
            Some(entry) if matches!(&entry.value, Value::Str(s) if s.as_str() == token) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

// =============================================================================
// InMemoryLedger
// =============================================================================

#[derive(Debug, Default)]
struct LedgerState {
    stock: HashMap<VoucherId, u32>,
    orders: HashMap<(UserId, VoucherId), VoucherOrder>,
}

/// In-memory durable ledger stand-in
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    fail_inserts: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a voucher row with stock
    pub fn with_voucher(self, voucher_id: VoucherId, stock: u32) -> Self {
        self.state.lock().stock.insert(voucher_id, stock);
        self
    }

    /// Make every subsequent insert fail with a backend error
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Delay every insert, to widen race windows in tests
    pub fn set_insert_delay(&self, delay: Option<Duration>) {
        *self.insert_delay.lock() = delay;
    }

    /// Remaining ledger stock for a voucher
    pub fn stock(&self, voucher_id: VoucherId) -> Option<u32> {
        self.state.lock().stock.get(&voucher_id).copied()
    }

    /// Number of order rows
    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    /// Snapshot of all order rows
    pub fn orders(&self) -> Vec<VoucherOrder> {
        self.state.lock().orders.values().cloned().collect()
    }
}

#[async_trait]
impl OrderLedger for InMemoryLedger {
    async fn insert_order(&self, order: &VoucherOrder) -> Result<(), LedgerError> {
        let delay = *self.insert_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("injected insert failure".to_string()));
        }

        let mut state = self.state.lock();
        let key = (order.user_id, order.voucher_id);
        if state.orders.contains_key(&key) {
            return Err(LedgerError::DuplicateOrder {
                user_id: order.user_id,
                voucher_id: order.voucher_id,
            });
        }
        state.orders.insert(key, order.clone());
        Ok(())
    }

    async fn find_order(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<Option<VoucherOrder>, LedgerError> {
        Ok(self.state.lock().orders.get(&(user_id, voucher_id)).cloned())
    }

    async fn conditional_decrement_stock(
        &self,
        voucher_id: VoucherId,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.lock();
        match state.stock.get_mut(&voucher_id) {
            None => Err(LedgerError::VoucherNotFound(voucher_id)),
            Some(0) => Ok(false),
            Some(stock) => {
                *stock -= 1;
                Ok(true)
            },
        }
    }

    async fn create_order(&self, order: &VoucherOrder) -> Result<bool, LedgerError> {
        let delay = *self.insert_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("injected insert failure".to_string()));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let key = (order.user_id, order.voucher_id);
        if state.orders.contains_key(&key) {
            return Err(LedgerError::DuplicateOrder {
                user_id: order.user_id,
                voucher_id: order.voucher_id,
            });
        }
        match state.stock.get_mut(&order.voucher_id) {
            None => Err(LedgerError::VoucherNotFound(order.voucher_id)),
            Some(0) => Ok(false),
            Some(stock) => {
                *stock -= 1;
                state.orders.insert(key, order.clone());
                Ok(true)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_voucher(store: &InMemorySharedStore, stock: i64, begin: i64, end: i64) {
        store
            .hset_multiple(
                "v",
                &[
                    ("stock", stock.to_string()),
                    ("begin", begin.to_string()),
                    ("end", end.to_string()),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_set_ttl() {
        let store = InMemorySharedStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_string_is_not_absent() {
        let store = InMemorySharedStore::new();
        store.set("null", "", None).await.unwrap();
        assert_eq!(store.get("null").await.unwrap(), Some(String::new()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx() {
        let store = InMemorySharedStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_nx("lock", "a", ttl).await.unwrap());
        assert!(!store.set_nx("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_set_nx_after_expiry() {
        let store = InMemorySharedStore::new();
        assert!(store
            .set_nx("lock", "a", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(store
            .set_nx("lock", "b", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_incr() {
        let store = InMemorySharedStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);

        store.set("s", "abc", None).await.unwrap();
        assert!(matches!(
            store.incr("s").await,
            Err(StoreError::TypeError { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemorySharedStore::new();
        store
            .hset_multiple("h", &[("f", "1".to_string())])
            .await
            .unwrap();
        assert!(store.get("h").await.is_err());
        assert_eq!(store.hget("h", "f").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.hget("h", "g").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_admission_steps() {
        let store = InMemorySharedStore::new();
        seed_voucher(&store, 1, 100, 200).await;

        assert_eq!(
            store.eval_admission("v", "o", "1", 50).await.unwrap(),
            AdmissionCode::NotStarted
        );
        assert_eq!(
            store.eval_admission("v", "o", "1", 201).await.unwrap(),
            AdmissionCode::Ended
        );
        assert_eq!(
            store.eval_admission("v", "o", "1", 150).await.unwrap(),
            AdmissionCode::Eligible
        );
        assert_eq!(
            store.eval_admission("v", "o", "1", 150).await.unwrap(),
            AdmissionCode::OutOfStock
        );
        assert_eq!(store.hget("v", "stock").await.unwrap(), Some("0".into()));
        assert!(store.sismember("o", "1").await.unwrap());
        assert_eq!(store.scard("o"), 1);
    }

    #[tokio::test]
    async fn test_admission_duplicate_checked_after_stock() {
        let store = InMemorySharedStore::new();
        seed_voucher(&store, 5, 0, i64::MAX).await;

        assert_eq!(
            store.eval_admission("v", "o", "9", 1).await.unwrap(),
            AdmissionCode::Eligible
        );
        assert_eq!(
            store.eval_admission("v", "o", "9", 1).await.unwrap(),
            AdmissionCode::DuplicateOrder
        );
        assert_eq!(store.hget("v", "stock").await.unwrap(), Some("4".into()));
    }

    #[tokio::test]
    async fn test_admission_unknown_voucher() {
        let store = InMemorySharedStore::new();
        assert_eq!(
            store.eval_admission("v", "o", "1", 1).await.unwrap(),
            AdmissionCode::UnknownVoucher
        );
    }

    #[tokio::test]
    async fn test_release_and_renew_check_token() {
        let store = InMemorySharedStore::new();
        store
            .set_nx("lock", "mine", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(!store.release_lock("lock", "theirs").await.unwrap());
        assert!(!store
            .renew_lock("lock", "theirs", Duration::from_secs(1))
            .await
            .unwrap());
        assert!(store
            .renew_lock("lock", "mine", Duration::from_secs(1))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        // renewed past the original TTL
        assert_eq!(store.get("lock").await.unwrap(), Some("mine".into()));

        assert!(store.release_lock("lock", "mine").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_unique_constraint() {
        let ledger = InMemoryLedger::new().with_voucher(1, 1);
        let order = VoucherOrder {
            order_id: 10,
            user_id: 2,
            voucher_id: 1,
            created_at: chrono::Utc::now(),
        };

        ledger.insert_order(&order).await.unwrap();
        assert!(matches!(
            ledger.insert_order(&order).await,
            Err(LedgerError::DuplicateOrder { .. })
        ));
        assert_eq!(ledger.find_order(2, 1).await.unwrap(), Some(order));
        assert_eq!(ledger.find_order(3, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ledger_conditional_decrement() {
        let ledger = InMemoryLedger::new().with_voucher(1, 1);
        assert!(ledger.conditional_decrement_stock(1).await.unwrap());
        assert!(!ledger.conditional_decrement_stock(1).await.unwrap());
        assert_eq!(ledger.stock(1), Some(0));
        assert!(matches!(
            ledger.conditional_decrement_stock(2).await,
            Err(LedgerError::VoucherNotFound(2))
        ));
    }

    #[tokio::test]
    async fn test_create_order_is_all_or_nothing() {
        let ledger = InMemoryLedger::new().with_voucher(1, 2);
        let order = |order_id, user_id| VoucherOrder {
            order_id,
            user_id,
            voucher_id: 1,
            created_at: chrono::Utc::now(),
        };

        assert!(ledger.create_order(&order(10, 1)).await.unwrap());
        assert_eq!(ledger.stock(1), Some(1));

        // Duplicate row leaves stock alone
        assert!(matches!(
            ledger.create_order(&order(11, 1)).await,
            Err(LedgerError::DuplicateOrder { .. })
        ));
        assert_eq!(ledger.stock(1), Some(1));

        // Failed write leaves stock alone
        ledger.set_fail_inserts(true);
        assert!(ledger.create_order(&order(12, 2)).await.is_err());
        assert_eq!(ledger.stock(1), Some(1));
        ledger.set_fail_inserts(false);

        assert!(ledger.create_order(&order(12, 2)).await.unwrap());
        assert!(!ledger.create_order(&order(13, 3)).await.unwrap());
        assert_eq!(ledger.stock(1), Some(0));
        assert_eq!(ledger.order_count(), 2);
    }

    #[tokio::test]
    async fn test_ledger_injected_failure() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_inserts(true);
        let order = VoucherOrder {
            order_id: 1,
            user_id: 1,
            voucher_id: 1,
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(
            ledger.insert_order(&order).await,
            Err(LedgerError::Backend(_))
        ));
        assert_eq!(ledger.order_count(), 0);
    }
}
