//! Error types for the seckill core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Shared store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Durable ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// ID generation error
    #[error("ID error: {0}")]
    Id(#[from] IdError),

    /// Cache layer error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Admission rejected or failed
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared store errors
///
/// Raised by [`SharedStore`](crate::engine::traits::SharedStore) implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection to the store failed or timed out
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Command was rejected by the store
    #[error("Command error: {0}")]
    CommandError(String),

    /// Stored value has an unexpected type or shape
    #[error("Type error at {key}: {message}")]
    TypeError {
        /// Key holding the offending value
        key: String,
        /// What was wrong with it
        message: String,
    },

    /// Script returned a value outside its contract
    #[error("Unexpected script result from {script}: {value}")]
    UnexpectedScriptResult {
        /// Script name
        script: &'static str,
        /// Raw returned value
        value: i64,
    },
}

/// Durable ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A row with the same (user, voucher) pair already exists
    #[error("Order already exists for user {user_id} and voucher {voucher_id}")]
    DuplicateOrder {
        /// User id
        user_id: u64,
        /// Voucher id
        voucher_id: u64,
    },

    /// Voucher row not found
    #[error("Voucher not found: {0}")]
    VoucherNotFound(u64),

    /// Backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// ID generation errors
#[derive(Error, Debug)]
pub enum IdError {
    /// The daily counter no longer fits in the low 32 bits
    #[error("Sequence exhausted for {key}: {value}")]
    SequenceExhausted {
        /// Counter key
        key: String,
        /// Counter value returned by the store
        value: i64,
    },

    /// The clock is before the generator epoch
    #[error("Clock is before epoch: now={now}, epoch={epoch}")]
    ClockBeforeEpoch {
        /// Current unix seconds
        now: i64,
        /// Configured epoch
        epoch: i64,
    },

    /// Counter increment failed
    #[error("Counter increment failed: {0}")]
    Store(#[from] StoreError),
}

/// Cache layer errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// No namespace registered under this name
    #[error("Unknown cache namespace: {0}")]
    UnknownNamespace(String),

    /// Namespace name collides with the order lock keys
    #[error("Cache namespace name is reserved: {0}")]
    ReservedNamespace(String),

    /// Could not win the build lock within the retry budget
    #[error("Rebuild contention on {key} after {attempts} attempts")]
    RebuildContention {
        /// Cache key being rebuilt
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// Payload could not be (de)serialized
    #[error("Serialization error at {key}: {message}")]
    Serialization {
        /// Cache key
        key: String,
        /// serde_json message
        message: String,
    },

    /// Loader failed
    #[error("Loader error: {0}")]
    Loader(String),

    /// Shared store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Admission outcomes that reject a request, plus internal failures
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Stock exhausted
    #[error("Out of stock")]
    OutOfStock,

    /// User already holds an order for this voucher
    #[error("Duplicate order")]
    DuplicateOrder,

    /// Order queue is full or closed
    #[error("System busy")]
    SystemBusy,

    /// Sale window has not opened yet
    #[error("Sale not started")]
    NotStarted,

    /// Sale window has closed
    #[error("Sale ended")]
    Ended,

    /// Voucher was never published to the shared store
    #[error("Unknown voucher: {0}")]
    UnknownVoucher(u64),

    /// Shared store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Order id allocation failed after stock was taken
    #[error("ID error: {0}")]
    Id(#[from] IdError),
}

impl AdmissionError {
    /// Stable code for callers and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::OutOfStock => "OUT_OF_STOCK",
            AdmissionError::DuplicateOrder => "DUPLICATE_ORDER",
            AdmissionError::SystemBusy => "SYSTEM_BUSY",
            AdmissionError::NotStarted => "NOT_STARTED",
            AdmissionError::Ended => "ENDED",
            AdmissionError::UnknownVoucher(_) => "UNKNOWN_VOUCHER",
            AdmissionError::Store(_) | AdmissionError::Id(_) => "INTERNAL",
        }
    }

    /// Whether this is a business rejection rather than an infrastructure failure
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AdmissionError::Store(_) | AdmissionError::Id(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_codes() {
        assert_eq!(AdmissionError::OutOfStock.code(), "OUT_OF_STOCK");
        assert_eq!(AdmissionError::DuplicateOrder.code(), "DUPLICATE_ORDER");
        assert_eq!(AdmissionError::SystemBusy.code(), "SYSTEM_BUSY");
        assert!(AdmissionError::SystemBusy.is_rejection());

        let internal = AdmissionError::Store(StoreError::ConnectionError("down".into()));
        assert_eq!(internal.code(), "INTERNAL");
        assert!(!internal.is_rejection());
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = CacheError::UnknownNamespace("shop".into()).into();
        assert!(err.to_string().contains("Unknown cache namespace: shop"));

        let err: Error = LedgerError::DuplicateOrder {
            user_id: 1,
            voucher_id: 2,
        }
        .into();
        assert!(err.to_string().contains("user 1"));
    }
}
