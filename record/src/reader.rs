//! Loading a single record, reassembling it from its stored entries.

use bytes::{Bytes, BytesMut};
use common::tuple::Tuple;
use common::{KeyValue, KeyValueIterator, ScanOptions, Subspace, Transaction, TransactionRead};

use crate::config::LoadOptions;
use crate::error::{Error, Result};
use crate::key::{
    pack_version_key, parse_suffix, unpack_version, RECORD_VERSION, START_SPLIT_RECORD,
    UNSPLIT_RECORD,
};
use crate::model::RawRecord;
use crate::sizes::SizeInfo;
use crate::version::{RecordVersion, VERSION_LENGTH};

/// Loads the record stored at `key`, or `None` if there is none.
///
/// Unless the legacy layout is in effect, this issues a range scan over the
/// record's prefix: even an unsplit record may have a version entry beside
/// its data. Within an open transaction, a version written as incomplete is
/// surfaced from transaction-local state.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn load(
    tx: &Transaction,
    subspace: &Subspace,
    key: &Tuple,
    options: &LoadOptions,
) -> Result<Option<RawRecord>> {
    if !options.split_long_records && options.missing_unsplit_record_suffix {
        return load_unsplit_legacy(tx, subspace, key).await;
    }

    let record_subspace = subspace.subspace(key);
    let mut unsplitter = SingleKeyUnsplitter::new(&record_subspace);
    let mut iter = tx
        .scan_iter(record_subspace.range(), ScanOptions::forward())
        .await?;
    while let Some(kv) = iter.next().await? {
        unsplitter.append(&kv)?;
    }

    let SingleKeyUnsplitter {
        mut size_info,
        mut version,
        result,
        ..
    } = unsplitter;

    // A version written in this transaction is not yet durable; surface it
    // from the transaction-local cache when no durable version entry exists.
    if version.is_none() {
        if let Some(local_version) = tx.get_local_version(&key.pack())? {
            version = Some(RecordVersion::incomplete(local_version));
            size_info.versioned_inline = true;
            size_info.key_count += 1;
            size_info.key_size += pack_version_key(&record_subspace).len() as u64;
            size_info.value_size += (1 + VERSION_LENGTH) as u64;
        }
    }

    match (result, version) {
        (Some(buffer), version) => Ok(Some(RawRecord {
            primary_key: key.clone(),
            raw_bytes: buffer.freeze(),
            version,
            sizes: size_info,
        })),
        (None, Some(_)) => Err(Error::FoundSplitWithoutStart {
            index: RECORD_VERSION,
            reverse: false,
            key: record_subspace.raw_prefix().clone(),
        }),
        (None, None) => Ok(None),
    }
}

// Save behavior before the unsplit suffix existed: the record's single entry
// lives at the bare primary key and can carry no version.
async fn load_unsplit_legacy(
    tx: &Transaction,
    subspace: &Subspace,
    key: &Tuple,
) -> Result<Option<RawRecord>> {
    let key_bytes = subspace.pack(key);
    let Some(value) = tx.get(key_bytes.clone()).await? else {
        return Ok(None);
    };
    let mut sizes = SizeInfo::new();
    sizes.set(&key_bytes, &value);
    Ok(Some(RawRecord {
        primary_key: key.clone(),
        raw_bytes: value,
        version: None,
        sizes,
    }))
}

/// Checks whether a record is stored at `key`.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn exists(
    tx: &Transaction,
    subspace: &Subspace,
    key: &Tuple,
    options: &LoadOptions,
) -> Result<bool> {
    if !options.split_long_records && options.missing_unsplit_record_suffix {
        return Ok(tx.get(subspace.pack(key)).await?.is_some());
    }

    let record_subspace = subspace.subspace(key);
    let mut iter = tx
        .scan_iter(record_subspace.range(), ScanOptions::forward().with_limit(1))
        .await?;
    Ok(iter.next().await?.is_some())
}

/// Reassembles one record from the entries under a single prefix, in
/// ascending key order.
struct SingleKeyUnsplitter<'a> {
    record_subspace: &'a Subspace,
    size_info: SizeInfo,
    last_index: i64,
    result: Option<BytesMut>,
    version: Option<RecordVersion>,
}

impl<'a> SingleKeyUnsplitter<'a> {
    fn new(record_subspace: &'a Subspace) -> Self {
        Self {
            record_subspace,
            size_info: SizeInfo::new(),
            last_index: UNSPLIT_RECORD,
            result: None,
            version: None,
        }
    }

    fn append(&mut self, kv: &KeyValue) -> Result<()> {
        let index = parse_suffix(self.record_subspace, &kv.key)?;
        if index == UNSPLIT_RECORD {
            if self.result.is_some() {
                return Err(Error::MoreThanOneUnsplitValue {
                    key: kv.key.clone(),
                });
            }
            self.result = Some(BytesMut::from(kv.value.as_ref()));
            self.size_info.add(&kv.key, &kv.value);
            self.size_info.split = false;
        } else if index == self.last_index + 1
            || (self.last_index == RECORD_VERSION && index == START_SPLIT_RECORD)
        {
            if index == START_SPLIT_RECORD {
                if self.result.is_some() {
                    return Err(Error::UnsplitFollowedBySplit {
                        key: kv.key.clone(),
                    });
                }
                self.result = Some(BytesMut::from(kv.value.as_ref()));
                self.size_info.split = true;
            } else if let Some(buffer) = self.result.as_mut() {
                buffer.extend_from_slice(&kv.value);
            } else {
                return Err(Error::FoundSplitWithoutStart {
                    index,
                    reverse: false,
                    key: kv.key.clone(),
                });
            }
            self.size_info.add(&kv.key, &kv.value);
            self.last_index = index;
        } else if index == RECORD_VERSION {
            self.version = Some(unpack_version(&kv.value)?);
            self.size_info.versioned_inline = true;
            self.size_info.add(&kv.key, &kv.value);
            self.last_index = RECORD_VERSION;
        } else if self.last_index >= START_SPLIT_RECORD {
            let expected = self.last_index + 1;
            return Err(Error::SplitSegmentsOutOfOrder {
                expected,
                found: index,
                key: kv.key.clone(),
            });
        } else {
            return Err(Error::FoundSplitWithoutStart {
                index,
                reverse: false,
                key: kv.key.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::Database;

    use super::*;
    use crate::config::SaveOptions;
    use crate::key::{pack_data_key, SPLIT_RECORD_SIZE};
    use crate::writer::save;

    fn subspace() -> Subspace {
        Subspace::new(Bytes::from_static(b"st"))
    }

    fn pk(name: &str) -> Tuple {
        Tuple::new().add_str(name)
    }

    #[tokio::test]
    async fn should_return_none_for_missing_record() {
        // given
        let db = Database::new();
        let tx = db.transaction();

        // when
        let result = load(&tx, &subspace(), &pk("missing"), &LoadOptions::default())
            .await
            .unwrap();

        // then
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn should_roundtrip_unsplit_record() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        save(
            &tx,
            &subspace(),
            &pk("a"),
            Bytes::from_static(b"hello"),
            None,
            &SaveOptions::default(),
            None,
        )
        .unwrap();

        // when
        let record = load(&tx, &subspace(), &pk("a"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();

        // then
        assert_eq!(record.raw_bytes, Bytes::from_static(b"hello"));
        assert_eq!(record.version, None);
        assert!(!record.sizes.split);
        assert!(!record.sizes.versioned_inline);
    }

    #[tokio::test]
    async fn should_roundtrip_empty_payload() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        save(
            &tx,
            &subspace(),
            &pk("empty"),
            Bytes::new(),
            None,
            &SaveOptions::default(),
            None,
        )
        .unwrap();

        // when
        let record = load(&tx, &subspace(), &pk("empty"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();

        // then
        assert!(record.raw_bytes.is_empty());
    }

    #[tokio::test]
    async fn should_reassemble_split_record() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let mut payload = vec![0u8; 3 * SPLIT_RECORD_SIZE + 7];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let payload = Bytes::from(payload);
        save(
            &tx,
            &subspace(),
            &pk("big"),
            payload.clone(),
            None,
            &SaveOptions::default(),
            None,
        )
        .unwrap();
        tx.commit().await.unwrap();

        // when
        let check = db.transaction();
        let record = load(&check, &subspace(), &pk("big"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();

        // then
        assert_eq!(record.raw_bytes, payload);
        assert!(record.sizes.split);
        assert_eq!(record.sizes.key_count, 4);
    }

    #[tokio::test]
    async fn should_roundtrip_boundary_payload_sizes() {
        // given
        let db = Database::new();
        for (name, len) in [
            ("one", 1),
            ("under", SPLIT_RECORD_SIZE - 1),
            ("exact", SPLIT_RECORD_SIZE),
            ("over", SPLIT_RECORD_SIZE + 1),
        ] {
            let tx = db.transaction();
            let payload = Bytes::from(vec![b'z'; len]);
            save(
                &tx,
                &subspace(),
                &pk(name),
                payload.clone(),
                None,
                &SaveOptions::default(),
                None,
            )
            .unwrap();
            tx.commit().await.unwrap();

            // when
            let check = db.transaction();
            let record = load(&check, &subspace(), &pk(name), &LoadOptions::default())
                .await
                .unwrap()
                .unwrap();

            // then
            assert_eq!(record.raw_bytes, payload, "payload length {}", len);
            assert_eq!(record.sizes.split, len > SPLIT_RECORD_SIZE);
        }
    }

    #[tokio::test]
    async fn should_surface_durable_version() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        save(
            &tx,
            &subspace(),
            &pk("v"),
            Bytes::from_static(b"data"),
            Some(RecordVersion::incomplete(4)),
            &SaveOptions::default(),
            None,
        )
        .unwrap();
        tx.commit().await.unwrap();

        // when
        let check = db.transaction();
        let record = load(&check, &subspace(), &pk("v"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();

        // then
        let version = record.version.unwrap();
        assert!(version.is_complete());
        assert_eq!(version.local_version(), 4);
        assert!(record.sizes.versioned_inline);
        assert_eq!(record.sizes.key_count, 2);
    }

    #[tokio::test]
    async fn should_surface_incomplete_version_within_transaction() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        save(
            &tx,
            &subspace(),
            &pk("v"),
            Bytes::from_static(b"x"),
            Some(RecordVersion::incomplete(7)),
            &SaveOptions::default(),
            None,
        )
        .unwrap();

        // when - read back in the same transaction, before commit
        let record = load(&tx, &subspace(), &pk("v"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();

        // then
        assert_eq!(record.raw_bytes, Bytes::from_static(b"x"));
        let version = record.version.unwrap();
        assert!(!version.is_complete());
        assert_eq!(version.local_version(), 7);
        assert!(record.sizes.versioned_inline);
        assert_eq!(record.sizes.key_count, 2);
    }

    #[tokio::test]
    async fn should_load_legacy_record_without_suffix() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let options = SaveOptions {
            split_long_records: false,
            omit_unsplit_suffix: true,
            ..SaveOptions::default()
        };
        save(
            &tx,
            &subspace(),
            &pk("legacy"),
            Bytes::from_static(b"legacy"),
            None,
            &options,
            None,
        )
        .unwrap();
        let load_options = LoadOptions {
            split_long_records: false,
            missing_unsplit_record_suffix: true,
        };

        // when
        let record = load(&tx, &subspace(), &pk("legacy"), &load_options)
            .await
            .unwrap()
            .unwrap();

        // then
        assert_eq!(record.raw_bytes, Bytes::from_static(b"legacy"));
        assert_eq!(record.version, None);
        assert!(!record.sizes.split);
        assert_eq!(record.sizes.key_count, 1);
    }

    #[tokio::test]
    async fn should_fail_on_bare_version_without_data() {
        // given - a version entry with no data entries beside it
        let db = Database::new();
        let tx = db.transaction();
        let record_subspace = subspace().subspace(&pk("bare"));
        let version = RecordVersion::complete([0; 10], 1);
        tx.set(
            pack_version_key(&record_subspace),
            crate::key::pack_version(&version).unwrap(),
        )
        .unwrap();

        // when
        let result = load(&tx, &subspace(), &pk("bare"), &LoadOptions::default()).await;

        // then
        assert!(matches!(
            result,
            Err(Error::FoundSplitWithoutStart {
                index: RECORD_VERSION,
                reverse: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn should_fail_on_split_index_gap() {
        // given - chunks at 1, 2, 4
        let db = Database::new();
        let tx = db.transaction();
        let record_subspace = subspace().subspace(&pk("gap"));
        for index in [1i64, 2, 4] {
            tx.set(
                pack_data_key(&record_subspace, index),
                Bytes::from_static(b"chunk"),
            )
            .unwrap();
        }

        // when
        let result = load(&tx, &subspace(), &pk("gap"), &LoadOptions::default()).await;

        // then
        assert!(matches!(
            result,
            Err(Error::SplitSegmentsOutOfOrder {
                expected: 3,
                found: 4,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn should_fail_on_split_without_start() {
        // given - chunks starting at 2
        let db = Database::new();
        let tx = db.transaction();
        let record_subspace = subspace().subspace(&pk("headless"));
        tx.set(
            pack_data_key(&record_subspace, 2),
            Bytes::from_static(b"chunk"),
        )
        .unwrap();

        // when
        let result = load(&tx, &subspace(), &pk("headless"), &LoadOptions::default()).await;

        // then
        assert!(matches!(
            result,
            Err(Error::FoundSplitWithoutStart {
                index: 2,
                reverse: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn should_fail_on_malformed_subkey() {
        // given - a sub-key with two tuple elements
        let db = Database::new();
        let tx = db.transaction();
        let record_subspace = subspace().subspace(&pk("bad"));
        tx.set(
            record_subspace.pack(&Tuple::new().add_int(0).add_int(0)),
            Bytes::from_static(b"value"),
        )
        .unwrap();

        // when
        let result = load(&tx, &subspace(), &pk("bad"), &LoadOptions::default()).await;

        // then
        assert!(matches!(result, Err(Error::UnexpectedSubkeyShape { .. })));
    }

    #[tokio::test]
    async fn should_report_existence_for_general_layout() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        save(
            &tx,
            &subspace(),
            &pk("here"),
            Bytes::from_static(b"data"),
            None,
            &SaveOptions::default(),
            None,
        )
        .unwrap();

        // when / then
        assert!(exists(&tx, &subspace(), &pk("here"), &LoadOptions::default())
            .await
            .unwrap());
        assert!(!exists(&tx, &subspace(), &pk("gone"), &LoadOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn should_report_existence_for_legacy_layout() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let save_options = SaveOptions {
            split_long_records: false,
            omit_unsplit_suffix: true,
            ..SaveOptions::default()
        };
        save(
            &tx,
            &subspace(),
            &pk("legacy"),
            Bytes::from_static(b"x"),
            None,
            &save_options,
            None,
        )
        .unwrap();
        let options = LoadOptions {
            split_long_records: false,
            missing_unsplit_record_suffix: true,
        };

        // when / then
        assert!(exists(&tx, &subspace(), &pk("legacy"), &options)
            .await
            .unwrap());
        assert!(!exists(&tx, &subspace(), &pk("other"), &options)
            .await
            .unwrap());
    }
}
