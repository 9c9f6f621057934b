//! Entry key layout for stored records.
//!
//! Every entry of a record lives at `prefix ∥ pack(suffix)` where `prefix` is
//! the record's packed primary key and `suffix` is a signed tuple integer.
//! Tuple packing preserves numeric order, so the version entry (`-1`) sorts
//! before the unsplit entry (`0`), which sorts before all split chunks
//! (`1, 2, …`).

use bytes::Bytes;
use common::tuple::{Element, Tuple};
use common::Subspace;

use crate::error::{Error, Result};
use crate::version::RecordVersion;

/// Records larger than this size (in bytes) are split into multiple entries.
pub const SPLIT_RECORD_SIZE: usize = 100_000;

/// Suffix of the entry holding a record's version.
pub const RECORD_VERSION: i64 = -1;

/// Suffix of the single entry of an unsplit record.
pub const UNSPLIT_RECORD: i64 = 0;

/// Suffix of the first chunk of a split record.
pub const START_SPLIT_RECORD: i64 = 1;

/// Packs the entry key for the given suffix under a record's subspace.
pub fn pack_data_key(record_subspace: &Subspace, suffix: i64) -> Bytes {
    record_subspace.pack(&Tuple::new().add_int(suffix))
}

/// Packs the key of a record's version entry.
pub fn pack_version_key(record_subspace: &Subspace) -> Bytes {
    pack_data_key(record_subspace, RECORD_VERSION)
}

/// Parses the integer suffix of an entry key under a record's subspace.
///
/// The remainder after the prefix must be exactly one integer element.
pub fn parse_suffix(record_subspace: &Subspace, full_key: &[u8]) -> Result<i64> {
    let tuple = record_subspace.unpack(full_key)?;
    match tuple.elements() {
        [Element::Int(suffix)] => Ok(*suffix),
        _ => Err(Error::UnexpectedSubkeyShape {
            key: Bytes::copy_from_slice(full_key),
        }),
    }
}

/// Splits a full key tuple into the primary key and its integer suffix.
pub(crate) fn split_suffix(tuple: Tuple, raw_key: &Bytes) -> Result<(Tuple, i64)> {
    match tuple.split_last() {
        Ok((primary_key, Element::Int(suffix))) => Ok((primary_key, suffix)),
        _ => Err(Error::UnexpectedSubkeyShape {
            key: raw_key.clone(),
        }),
    }
}

/// Packs a record version into the version entry's value.
///
/// Complete versions pack to the final bytes. Incomplete versions pack with
/// placeholder transaction bytes and the trailing offset the store's
/// versionstamped-value mutation consumes; that tail is not durable.
pub fn pack_version(version: &RecordVersion) -> Result<Bytes> {
    let tuple = Tuple::new().add_versionstamp(version.to_versionstamp());
    if version.is_complete() {
        Ok(tuple.pack())
    } else {
        Ok(tuple.pack_with_versionstamp()?)
    }
}

/// Decodes a version entry's value; stamps read back are always complete.
pub fn unpack_version(value: &[u8]) -> Result<RecordVersion> {
    let tuple = Tuple::unpack(value)?;
    let stamp = tuple.get_versionstamp(0)?;
    Ok(RecordVersion::from_versionstamp(stamp))
}
