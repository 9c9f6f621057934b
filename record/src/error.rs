//! Error types for the record split codec.

use bytes::Bytes;
use common::tuple::TupleError;
use common::StorageError;

/// Error type for split-codec operations.
///
/// Variants carry the offending key bytes, indices, and scan direction so
/// that messages keep their diagnostic value when they surface in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller passed an invalid combination of arguments.
    InvalidArgument(String),

    /// Payload exceeds the chunk threshold and splitting is disabled.
    RecordTooLong { length: usize },

    /// Split chunk indices were not contiguous in scan order.
    SplitSegmentsOutOfOrder {
        expected: i64,
        found: i64,
        key: Bytes,
    },

    /// A split chunk, or a version with no data, appeared without a
    /// reachable start in the scan direction.
    FoundSplitWithoutStart {
        index: i64,
        reverse: bool,
        key: Bytes,
    },

    /// More than one unsplit entry under a single record prefix.
    MoreThanOneUnsplitValue { key: Bytes },

    /// An unsplit entry mixed with split chunks under a single record prefix.
    UnsplitFollowedBySplit { key: Bytes },

    /// A record sub-key was not exactly one integer element.
    UnexpectedSubkeyShape { key: Bytes },

    /// A version entry was read by a reader configured for the legacy
    /// no-version format.
    OldVersionFormat { key: Bytes },

    /// Continuation requested outside the permitted window.
    IllegalContinuationAccess,

    /// Encoding or decoding errors.
    Encoding(String),

    /// Storage-related errors from the underlying store.
    Storage(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::RecordTooLong { length } => write!(
                f,
                "Record is too long ({} bytes) to be stored in a single value; \
                 consider allowing split records",
                length
            ),
            Error::SplitSegmentsOutOfOrder {
                expected,
                found,
                key,
            } => write!(
                f,
                "Split record segments out of order: expected {}, found {} at key {:02x?}",
                expected, found, key
            ),
            Error::FoundSplitWithoutStart {
                index,
                reverse,
                key,
            } => write!(
                f,
                "Found split record without start: index {} (reverse: {}) at key {:02x?}",
                index, reverse, key
            ),
            Error::MoreThanOneUnsplitValue { key } => {
                write!(f, "More than one unsplit value at key {:02x?}", key)
            }
            Error::UnsplitFollowedBySplit { key } => {
                write!(f, "Unsplit value followed by split at key {:02x?}", key)
            }
            Error::UnexpectedSubkeyShape { key } => write!(
                f,
                "Expected only a single integer key extension for split record at key {:02x?}",
                key
            ),
            Error::OldVersionFormat { key } => write!(
                f,
                "Found record version when old format specified at key {:02x?}",
                key
            ),
            Error::IllegalContinuationAccess => write!(
                f,
                "Continuation accessed before a cursor result was produced"
            ),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<TupleError> for Error {
    fn from(err: TupleError) -> Self {
        Error::Encoding(err.message)
    }
}

/// Result type alias for split-codec operations.
pub type Result<T> = std::result::Result<T, Error>;
