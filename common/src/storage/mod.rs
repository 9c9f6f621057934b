//! The ordered key-value store contract consumed by the record layer.
//!
//! The store is transactional: mutations (`set`, `clear`, `clear_range`,
//! versionstamped values) are buffered in a [`memory::Transaction`] and become
//! durable atomically at commit. Reads within a transaction observe its own
//! buffered mutations (read-your-writes), with one deliberate exception:
//! pending versionstamped values stay invisible until commit resolves them —
//! callers track those through the transaction-local version cache instead.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// One key-value pair as returned by reads and range scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Options for range scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Iterate in descending key order.
    pub reverse: bool,
    /// Maximum number of entries the scan will yield, `None` for unlimited.
    pub limit: Option<usize>,
}

impl ScanOptions {
    pub fn forward() -> Self {
        Self::default()
    }

    pub fn reverse() -> Self {
        Self {
            reverse: true,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage-related errors
    Storage(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Iterator over scanned key-value pairs.
#[async_trait]
pub trait KeyValueIterator {
    async fn next(&mut self) -> StorageResult<Option<KeyValue>>;
}

/// Read operations available inside a transaction.
#[async_trait]
pub trait TransactionRead: Send + Sync {
    /// Gets the value for a key, or `None` if absent.
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>>;

    /// Returns an iterator over entries in the given range.
    ///
    /// The returned iterator is owned and does not borrow from the
    /// transaction, allowing it to be stored in structs or passed across
    /// await points.
    async fn scan_iter(
        &self,
        range: BytesRange,
        options: ScanOptions,
    ) -> StorageResult<Box<dyn KeyValueIterator + Send + 'static>>;
}
