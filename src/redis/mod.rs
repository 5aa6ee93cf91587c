//! Redis integration for coordination and caching
//!
//! # Architecture
//!
//! ```text
//! RedisSharedStore ──► RedisPool (multiplexed connection, retries, timeouts)
//!        │
//!        └──────────► LuaScripts (seckill, unlock, renew_lock)
//! ```
//!
//! Key layout is documented in [`crate::keys`].
//!
//! # Example
//!
//! ```rust,no_run
//! use seckill_core::redis::{RedisConfig, RedisSharedStore};
//! use seckill_core::engine::traits::SharedStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisSharedStore::connect(RedisConfig::default()).await?;
//! assert_eq!(store.store_id(), "redis-store-v1");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod scripts;
pub mod store;
pub mod util;

pub use connection::{RedisConfig, RedisPool, RetryPolicy};
pub use scripts::LuaScripts;
pub use store::RedisSharedStore;
