//! Globally unique, time-ordered 64-bit identifiers
//!
//! # Layout
//!
//! ```text
//!  63                              32 31                               0
//! ┌──────────────────────────────────┬──────────────────────────────────┐
//! │ seconds since 2022-01-01T00:00Z  │ per-(prefix, day) counter        │
//! └──────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! The counter lives in the shared store under `icr:{prefix}:{yyyy:MM:dd}`
//! and is bumped with an atomic INCR, so every process sharing the store draws
//! from the same sequence. A new key per UTC day resets the sequence without
//! any explicit reset step, and the key doubles as a daily volume counter.

use crate::engine::traits::SharedStore;
use crate::error::IdError;
use crate::keys;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

/// 2022-01-01T00:00:00Z
pub const DEFAULT_EPOCH_SECS: i64 = 1_640_995_200;

/// Width of the sequence part
pub const SEQUENCE_BITS: u32 = 32;

const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Store-backed ID generator
#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn SharedStore>,
    epoch_secs: i64,
}

impl IdGenerator {
    /// Generator using [`DEFAULT_EPOCH_SECS`]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_epoch(store, DEFAULT_EPOCH_SECS)
    }

    /// Generator with a custom epoch (unix seconds)
    pub fn with_epoch(store: Arc<dyn SharedStore>, epoch_secs: i64) -> Self {
        Self { store, epoch_secs }
    }

    /// Next identifier for `prefix`
    ///
    /// Store failures are returned as-is; the caller decides whether to retry
    /// or abort.
    pub async fn next_id(&self, prefix: &str) -> Result<u64, IdError> {
        self.next_id_at(prefix, Utc::now()).await
    }

    /// Next identifier for `prefix` as of `now`
    ///
    /// Timestamp bits and day key both come from `now`, which keeps
    /// `(timestamp, sequence)` pairs unique across midnight.
    pub async fn next_id_at(&self, prefix: &str, now: DateTime<Utc>) -> Result<u64, IdError> {
        let elapsed = now.timestamp() - self.epoch_secs;
        if elapsed < 0 {
            return Err(IdError::ClockBeforeEpoch {
                now: now.timestamp(),
                epoch: self.epoch_secs,
            });
        }

        let key = keys::id_counter(prefix, now.date_naive());
        let sequence = self.store.incr(&key).await?;
        if sequence < 1 || sequence as u64 > SEQUENCE_MASK {
            return Err(IdError::SequenceExhausted {
                key,
                value: sequence,
            });
        }

        Ok(((elapsed as u64) << SEQUENCE_BITS) | sequence as u64)
    }

    /// Number of ids issued for `prefix` on `day`
    pub async fn daily_count(&self, prefix: &str, day: NaiveDate) -> Result<u64, IdError> {
        let key = keys::id_counter(prefix, day);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => raw.parse::<u64>().map_err(|_| IdError::SequenceExhausted {
                key,
                value: -1,
            }),
        }
    }

    /// Split an id into its issue time and sequence number
    pub fn decompose(&self, id: u64) -> (Option<DateTime<Utc>>, u32) {
        let secs = (id >> SEQUENCE_BITS) as i64 + self.epoch_secs;
        let issued = Utc.timestamp_opt(secs, 0).single();
        (issued, (id & SEQUENCE_MASK) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stubs::InMemorySharedStore;
    use std::collections::HashSet;

    fn generator() -> (Arc<InMemorySharedStore>, IdGenerator) {
        let store = Arc::new(InMemorySharedStore::new());
        let gen = IdGenerator::new(store.clone());
        (store, gen)
    }

    #[tokio::test]
    async fn test_layout() {
        let (_, gen) = generator();
        let now = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 10).unwrap();

        let first = gen.next_id_at("order", now).await.unwrap();
        let second = gen.next_id_at("order", now).await.unwrap();

        assert_eq!(first, (10 << 32) | 1);
        assert_eq!(second, (10 << 32) | 2);
        assert_eq!(gen.decompose(second), (Some(now), 2));
    }

    #[tokio::test]
    async fn test_prefixes_have_separate_sequences() {
        let (_, gen) = generator();
        let now = Utc::now();

        let a = gen.next_id_at("order", now).await.unwrap();
        let b = gen.next_id_at("refund", now).await.unwrap();
        assert_eq!(a & SEQUENCE_MASK, 1);
        assert_eq!(b & SEQUENCE_MASK, 1);
    }

    #[tokio::test]
    async fn test_day_rollover_uses_new_key_and_keeps_order() {
        let (_, gen) = generator();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        for _ in 0..5 {
            gen.next_id_at("order", late).await.unwrap();
        }
        let before = gen.next_id_at("order", late).await.unwrap();
        let after = gen.next_id_at("order", early).await.unwrap();

        assert_eq!(after & SEQUENCE_MASK, 1);
        assert!(after > before);
        assert_eq!(gen.daily_count("order", late.date_naive()).await.unwrap(), 6);
        assert_eq!(gen.daily_count("order", early.date_naive()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clock_before_epoch() {
        let (_, gen) = generator();
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            gen.next_id_at("order", past).await,
            Err(IdError::ClockBeforeEpoch { .. })
        ));
    }

    #[tokio::test]
    async fn test_sequence_exhausted() {
        let (store, gen) = generator();
        let now = Utc::now();
        let key = keys::id_counter("order", now.date_naive());
        store
            .set(&key, &SEQUENCE_MASK.to_string(), None)
            .await
            .unwrap();

        assert!(matches!(
            gen.next_id_at("order", now).await,
            Err(IdError::SequenceExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_sequential_ids_strictly_increase() {
        let (_, gen) = generator();
        let mut last = 0;
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = gen.next_id("order").await.unwrap();
            assert!(id > last);
            assert!(seen.insert(id));
            last = id;
        }
    }
}
