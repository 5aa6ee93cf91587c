//! Seckill core - flash-sale ordering over a shared coordination store
//!
//! This library provides the concurrency core of a flash-sale ("seckill")
//! service:
//! - Time-ordered 64-bit order ids from a shared daily counter
//! - A token-checked distributed lock with optional TTL renewal
//! - A read-through cache with pass-through, mutex and logical-expiration
//!   strategies configured per namespace
//! - Atomic admission (window, stock, one order per user) in a single script
//! - Asynchronous order persistence behind a bounded queue

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod keys;
pub mod types;

/// Prometheus metrics
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Redis implementation of the shared store
pub mod redis;

/// Read-through cache with per-namespace resilience strategies
pub mod cache;

/// Globally unique order ids
pub mod idgen;

/// Distributed lock
pub mod lock;

/// Admission controller, order consumer and pipeline wiring
pub mod seckill;

// Re-export main types
pub use error::{Error, Result};
pub use seckill::{SeckillPipeline, SeckillPipelineBuilder};
pub use types::{OrderId, OrderStatus, SeckillVoucher, UserId, VoucherId, VoucherOrder};
