//! Data types produced by record reads.

use bytes::Bytes;
use common::Tuple;

use crate::sizes::SizeInfo;
use crate::version::RecordVersion;

/// A logical record reassembled from its stored entries.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// The record's primary key within its subspace.
    pub primary_key: Tuple,
    /// The serialized payload, rejoined from its chunks.
    pub raw_bytes: Bytes,
    /// The record's version, if one is stored or pending in the transaction.
    pub version: Option<RecordVersion>,
    /// Sizes of the entries this record was read from.
    pub sizes: SizeInfo,
}
