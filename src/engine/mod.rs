//! Pluggable backends for the shared store and the durable ledger
//!
//! [`traits`] defines the seams; [`stubs`] holds in-memory implementations.
//! The Redis implementation of [`SharedStore`] lives in [`crate::redis`].

pub mod stubs;
pub mod traits;

pub use stubs::{InMemoryLedger, InMemorySharedStore};
pub use traits::{AdmissionCode, OrderLedger, SharedStore};
