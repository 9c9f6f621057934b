//! Options for save, delete, load, and streaming operations.

use bytes::Bytes;

use crate::limit::ScanLimits;

/// Options controlling how a record is saved.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Allow payloads larger than the chunk threshold, chunked across
    /// multiple entries.
    pub split_long_records: bool,
    /// Legacy layout: write a single entry at the bare primary key with no
    /// suffix. Requires `split_long_records` off and no version.
    pub omit_unsplit_suffix: bool,
    /// Use the previous record's sizes to clear only what the old layout
    /// could have occupied. When off, the whole record range is cleared.
    pub clear_based_on_previous_size_info: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            split_long_records: true,
            omit_unsplit_suffix: false,
            clear_based_on_previous_size_info: false,
        }
    }
}

/// Options controlling how a record is deleted.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    /// Whether the store splits long records.
    pub split_long_records: bool,
    /// Legacy layout: the record lives at the bare primary key.
    pub missing_unsplit_record_suffix: bool,
    /// Use the previous record's sizes to clear only what it occupied.
    pub clear_based_on_previous_size_info: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            split_long_records: true,
            missing_unsplit_record_suffix: false,
            clear_based_on_previous_size_info: false,
        }
    }
}

/// Options controlling how a single record is loaded.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Whether the store splits long records.
    pub split_long_records: bool,
    /// Legacy layout: the record lives at the bare primary key.
    pub missing_unsplit_record_suffix: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            split_long_records: true,
            missing_unsplit_record_suffix: false,
        }
    }
}

/// Options controlling a streaming scan over many records.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Iterate records in descending primary-key order.
    pub reverse: bool,
    /// The store predates version entries; reading one is an error.
    pub old_version_format: bool,
    /// Resume the scan just past this continuation, or start fresh if `None`.
    pub continuation: Option<Bytes>,
    /// Scan budget; checked only between records.
    pub limits: ScanLimits,
}

impl StreamOptions {
    pub fn forward() -> Self {
        Self::default()
    }

    pub fn reverse() -> Self {
        Self {
            reverse: true,
            ..Self::default()
        }
    }

    pub fn with_continuation(mut self, continuation: Option<Bytes>) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }
}
