//! Saving and deleting records, splitting across multiple entries as needed.

use bytes::Bytes;
use common::tuple::Tuple;
use common::{Subspace, Transaction};

use crate::config::{DeleteOptions, SaveOptions};
use crate::error::{Error, Result};
use crate::key::{
    pack_data_key, pack_version, pack_version_key, SPLIT_RECORD_SIZE, START_SPLIT_RECORD,
    UNSPLIT_RECORD,
};
use crate::sizes::SizeInfo;
use crate::version::RecordVersion;

/// Saves a record, using multiple entries if the payload exceeds the chunk
/// threshold. Returns the sizes of what was written.
///
/// `previous` describes the record being overwritten (if any) and lets the
/// save clear only as much of the old layout as necessary; pass `None` for a
/// fresh write. See [`SaveOptions`] for the layout controls.
#[tracing::instrument(level = "trace", skip_all)]
pub fn save(
    tx: &Transaction,
    subspace: &Subspace,
    key: &Tuple,
    serialized: Bytes,
    version: Option<RecordVersion>,
    options: &SaveOptions,
    previous: Option<&SizeInfo>,
) -> Result<SizeInfo> {
    if options.omit_unsplit_suffix {
        if version.is_some() {
            return Err(Error::InvalidArgument(
                "cannot include version in-line using old unsplit record format".to_string(),
            ));
        }
        if options.split_long_records {
            return Err(Error::InvalidArgument(
                "cannot omit unsplit suffix when splitting long records".to_string(),
            ));
        }
    }

    let record_subspace = subspace.subspace(key);
    let mut sizes = SizeInfo::new();

    if serialized.len() > SPLIT_RECORD_SIZE {
        if !options.split_long_records {
            return Err(Error::RecordTooLong {
                length: serialized.len(),
            });
        }
        write_split_record(tx, key, &record_subspace, &serialized, options, previous, &mut sizes)?;
    } else {
        if options.split_long_records
            || previous.is_none()
            || previous.is_some_and(|p| p.versioned_inline)
        {
            clear_previous_split_record(tx, key, &record_subspace, options.clear_based_on_previous_size_info, previous)?;
        }
        let record_key = if options.omit_unsplit_suffix {
            record_subspace.raw_prefix().clone()
        } else {
            pack_data_key(&record_subspace, UNSPLIT_RECORD)
        };
        tx.set(record_key.clone(), serialized.clone())?;
        sizes.set(&record_key, &serialized);
        sizes.split = false;
    }

    write_version(tx, key, &record_subspace, version, &mut sizes)?;
    Ok(sizes)
}

fn write_split_record(
    tx: &Transaction,
    key: &Tuple,
    record_subspace: &Subspace,
    serialized: &Bytes,
    options: &SaveOptions,
    previous: Option<&SizeInfo>,
    sizes: &mut SizeInfo,
) -> Result<()> {
    clear_previous_split_record(tx, key, record_subspace, options.clear_based_on_previous_size_info, previous)?;
    let mut index = START_SPLIT_RECORD;
    let mut offset = 0;
    while offset < serialized.len() {
        let next_offset = (offset + SPLIT_RECORD_SIZE).min(serialized.len());
        let chunk_key = pack_data_key(record_subspace, index);
        let chunk = serialized.slice(offset..next_offset);
        tx.set(chunk_key.clone(), chunk.clone())?;
        if offset == 0 {
            sizes.set(&chunk_key, &chunk);
            sizes.split = true;
        } else {
            sizes.add(&chunk_key, &chunk);
        }
        index += 1;
        offset = next_offset;
    }
    Ok(())
}

fn write_version(
    tx: &Transaction,
    key: &Tuple,
    record_subspace: &Subspace,
    version: Option<RecordVersion>,
    sizes: &mut SizeInfo,
) -> Result<()> {
    let Some(version) = version else {
        sizes.versioned_inline = false;
        return Ok(());
    };
    let version_key = pack_version_key(record_subspace);
    let version_value = pack_version(&version)?;
    if version.is_complete() {
        tx.set(version_key.clone(), version_value.clone())?;
    } else {
        tx.set_versionstamped_value(version_key.clone(), version_value.clone())?;
        tx.add_to_local_version_cache(key.pack(), version.local_version())?;
    }
    sizes.versioned_inline = true;
    sizes.add(&version_key, &version_value);
    if !version.is_complete() {
        // The trailing offset tells the store where to splice the stamp at
        // commit; it never lands on disk, so keep it out of the metric.
        sizes.value_size -= 4;
    }
    Ok(())
}

/// Clears whatever a prior record at `key` may still occupy.
///
/// With size information about the previous record, an unsplit unversioned
/// record needs only its single entry cleared; anything split or versioned
/// may have more entries than the new write, so the whole range goes.
fn clear_previous_split_record(
    tx: &Transaction,
    key: &Tuple,
    record_subspace: &Subspace,
    clear_based_on_previous_size_info: bool,
    previous: Option<&SizeInfo>,
) -> Result<()> {
    if clear_based_on_previous_size_info {
        if let Some(previous) = previous {
            if previous.split || previous.versioned_inline {
                tx.clear_range(record_subspace.range())?;
            } else {
                tx.clear(pack_data_key(record_subspace, UNSPLIT_RECORD))?;
            }
        }
    } else {
        tx.clear_range(record_subspace.range())?;
    }
    if tx.get_local_version(&key.pack())?.is_some() {
        tx.remove_version_mutation(&pack_version_key(record_subspace))?;
    }
    Ok(())
}

/// Deletes a record, clearing only as much as the previous sizes require.
#[tracing::instrument(level = "trace", skip_all)]
pub fn delete(
    tx: &Transaction,
    subspace: &Subspace,
    key: &Tuple,
    options: &DeleteOptions,
    previous: Option<&SizeInfo>,
) -> Result<()> {
    if !options.split_long_records && options.missing_unsplit_record_suffix {
        tx.clear(subspace.pack(key))?;
    } else {
        let record_subspace = subspace.subspace(key);
        clear_previous_split_record(
            tx,
            key,
            &record_subspace,
            options.clear_based_on_previous_size_info,
            previous,
        )?;
    }
    Ok(())
}
