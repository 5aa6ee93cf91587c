//! Flash-sale ordering: atomic admission in front, async persistence behind
//!
//! # Architecture
//!
//! ```text
//!  admit(user, voucher)
//!        │
//!        ▼
//!  ┌──────────────────────┐   eval_admission   ┌──────────────┐
//!  │ AdmissionController  │ ─────────────────► │ SharedStore  │
//!  └──────────┬───────────┘   next_id (INCR)   └──────────────┘
//!             │ try_send(OrderTask)
//!             ▼
//!       bounded mpsc queue
//!             │
//!             ▼
//!  ┌──────────────────────┐  lock:order:{uid}  ┌──────────────┐
//!  │ OrderConsumer × N    │ ─────────────────► │ OrderLedger  │
//!  └──────────────────────┘                    └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use seckill_core::engine::{InMemoryLedger, InMemorySharedStore};
//! use seckill_core::seckill::SeckillPipeline;
//! use seckill_core::types::SeckillVoucher;
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemorySharedStore::new());
//! let ledger = Arc::new(InMemoryLedger::new().with_voucher(1, 100));
//! let pipeline = SeckillPipeline::builder(store, ledger).queue_capacity(1024).start()?;
//!
//! let now = Utc::now();
//! pipeline
//!     .publish_voucher(&SeckillVoucher::new(1, 100, now, now + Duration::hours(1)))
//!     .await?;
//! let order_id = pipeline.admit(42, 1).await?;
//! assert!(order_id > 0);
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod consumer;
pub mod pipeline;

pub use admission::AdmissionController;
pub use consumer::{OrderConsumer, OrderOutcome};
pub use pipeline::{SeckillPipeline, SeckillPipelineBuilder};
