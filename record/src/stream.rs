//! Streaming reassembly of records from an unbounded range scan.
//!
//! [`SplitRecordCursor`] groups adjacent entries of a scan by record prefix
//! and replays the split layout in either direction. It may exceed the scan
//! budget in order to stop only in between records: the budget is consulted
//! at record boundaries, never in the middle of one, no matter how many
//! entries the record in flight still needs.

use bytes::{Bytes, BytesMut};
use common::tuple::Tuple;
use common::{KeyValue, Subspace, Transaction};

use crate::config::StreamOptions;
use crate::cursor::{CursorResult, KeyValueCursor, NoNextReason};
use crate::error::{Error, Result};
use crate::key::{
    pack_version_key, parse_suffix, split_suffix, unpack_version, RECORD_VERSION,
    START_SPLIT_RECORD, UNSPLIT_RECORD,
};
use crate::limit::LimitManager;
use crate::model::RawRecord;
use crate::sizes::SizeInfo;
use crate::version::{RecordVersion, VERSION_LENGTH};

/// In reverse, a record's entries arrive highest suffix first; when its
/// prefix ends, the record must have reached one of these suffixes or chunks
/// are missing below it.
fn is_valid_reverse_stop(index: i64) -> bool {
    index == UNSPLIT_RECORD || index == START_SPLIT_RECORD || index == RECORD_VERSION
}

/// The record currently being accumulated.
struct Accumulator {
    primary_key: Tuple,
    record_subspace: Subspace,
    /// Payload gathered so far; `None` while only a version has been seen.
    value: Option<BytesMut>,
    version: Option<RecordVersion>,
    /// Suffix of the most recent data or version entry.
    index: i64,
}

impl Accumulator {
    /// Folds in a further entry sharing this record's prefix. Returns whether
    /// the record is now known to be complete.
    fn append_next(
        &mut self,
        kv: KeyValue,
        size_info: &mut SizeInfo,
        reverse: bool,
        old_version_format: bool,
    ) -> Result<bool> {
        let index = parse_suffix(&self.record_subspace, &kv.key)?;
        size_info.add(&kv.key, &kv.value);
        if !reverse
            && self.index == RECORD_VERSION
            && (index == UNSPLIT_RECORD || index == START_SPLIT_RECORD)
        {
            // Forward scan that opened with the version entry; the data
            // starts here. An unsplit entry ends the record, a first chunk
            // means more are coming.
            self.value = Some(BytesMut::from(kv.value.as_ref()));
            self.index = index;
            size_info.split = index == START_SPLIT_RECORD;
            Ok(index == UNSPLIT_RECORD)
        } else if !reverse && index == self.index + 1 {
            match self.value.as_mut() {
                Some(buffer) => buffer.extend_from_slice(&kv.value),
                None => self.value = Some(BytesMut::from(kv.value.as_ref())),
            }
            self.index = index;
            Ok(false)
        } else if reverse
            && index == RECORD_VERSION
            && (self.index == START_SPLIT_RECORD || self.index == UNSPLIT_RECORD)
        {
            // The version entry sorts first, so in reverse it arrives last
            // and closes the record.
            if old_version_format {
                return Err(Error::OldVersionFormat { key: kv.key });
            }
            self.version = Some(unpack_version(&kv.value)?);
            self.index = index;
            Ok(true)
        } else if reverse && index == self.index - 1 && index != RECORD_VERSION {
            let mut joined = BytesMut::from(kv.value.as_ref());
            if let Some(tail) = self.value.take() {
                joined.extend_from_slice(&tail);
            }
            self.value = Some(joined);
            self.index = index;
            Ok(false)
        } else {
            let expected = self.index + if reverse { -1 } else { 1 };
            if (reverse && expected == START_SPLIT_RECORD)
                || (!reverse && self.index == RECORD_VERSION)
            {
                Err(Error::FoundSplitWithoutStart {
                    index,
                    reverse,
                    key: kv.key,
                })
            } else {
                Err(Error::SplitSegmentsOutOfOrder {
                    expected,
                    found: index,
                    key: kv.key,
                })
            }
        }
    }
}

/// A cursor of logical records over an inner cursor of raw entries.
///
/// Emitted records are strictly monotonic in primary-key order for the scan
/// direction. The continuation after each record resumes at the first entry
/// of the next one, so a resumed scan re-reads nothing that was emitted.
pub struct SplitRecordCursor<'t> {
    tx: &'t Transaction,
    subspace: Subspace,
    inner: KeyValueCursor<'t>,
    reverse: bool,
    old_version_format: bool,
    limit_manager: LimitManager,
    size_info: SizeInfo,
    acc: Option<Accumulator>,
    /// Look-ahead entry whose prefix opened the next record, held with its
    /// own continuation until the caller asks for that record.
    pending: Option<(KeyValue, Option<Bytes>)>,
    inner_no_next_reason: Option<NoNextReason>,
    continuation: Option<Bytes>,
    may_access_continuation: bool,
    last_no_next_reason: Option<NoNextReason>,
}

impl<'t> SplitRecordCursor<'t> {
    /// Opens a streaming cursor over every record in `subspace`.
    pub fn new(tx: &'t Transaction, subspace: Subspace, options: StreamOptions) -> Self {
        let inner = KeyValueCursor::new(tx, subspace.range(), options.reverse)
            .resume_from(options.continuation.clone());
        Self {
            tx,
            subspace,
            inner,
            reverse: options.reverse,
            old_version_format: options.old_version_format,
            limit_manager: LimitManager::new(options.limits),
            size_info: SizeInfo::new(),
            acc: None,
            pending: None,
            inner_no_next_reason: None,
            continuation: options.continuation,
            may_access_continuation: false,
            last_no_next_reason: None,
        }
    }

    /// Produces the next fully reassembled record, or the reason there is
    /// none. The scan budget is checked here, between records, and nowhere
    /// else.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn on_next(&mut self) -> Result<CursorResult<RawRecord>> {
        self.may_access_continuation = false;
        if self.limit_manager.is_stopped() {
            let reason = self.merge_no_next_reason();
            return Ok(self.finish_no_next(reason));
        }

        self.append_until_new_key().await?;

        if let Some(acc) = &self.acc {
            if acc.version.is_some() && acc.value.is_none() {
                return Err(Error::FoundSplitWithoutStart {
                    index: RECORD_VERSION,
                    reverse: self.reverse,
                    key: acc.record_subspace.raw_prefix().clone(),
                });
            }
        }

        // Account for a version pending in this transaction when the record
        // carried no durable version entry.
        if !self.old_version_format {
            if let Some(acc) = self.acc.as_mut() {
                if acc.version.is_none() {
                    if let Some(local_version) =
                        self.tx.get_local_version(&acc.primary_key.pack())?
                    {
                        acc.version = Some(RecordVersion::incomplete(local_version));
                        self.size_info.versioned_inline = true;
                        self.size_info.key_count += 1;
                        self.size_info.key_size +=
                            pack_version_key(&acc.record_subspace).len() as u64;
                        self.size_info.value_size += (1 + VERSION_LENGTH) as u64;
                    }
                }
            }
        }

        match self.acc.take() {
            Some(Accumulator {
                primary_key,
                value: Some(value),
                version,
                ..
            }) => {
                self.size_info.versioned_inline = version.is_some();
                let record = RawRecord {
                    primary_key,
                    raw_bytes: value.freeze(),
                    version,
                    sizes: self.size_info,
                };
                self.may_access_continuation = true;
                self.last_no_next_reason = None;
                Ok(CursorResult::Next {
                    value: record,
                    continuation: self.continuation.clone(),
                })
            }
            _ => {
                let reason = self.merge_no_next_reason();
                Ok(self.finish_no_next(reason))
            }
        }
    }

    /// The continuation of the most recent result.
    ///
    /// Only valid immediately after [`on_next`](Self::on_next) returned; any
    /// other access is a caller bug.
    pub fn continuation(&self) -> Result<Option<Bytes>> {
        if !self.may_access_continuation {
            return Err(Error::IllegalContinuationAccess);
        }
        Ok(self.continuation.clone())
    }

    /// Why the cursor most recently produced no next record, if it did.
    pub fn no_next_reason(&self) -> Option<NoNextReason> {
        self.last_no_next_reason
    }

    /// Releases the inner scan. Continuations captured so far remain valid.
    pub fn close(&mut self) {
        self.inner.close();
    }

    // Consume inner entries until the current record is complete, the prefix
    // changes, or the inner cursor has nothing more.
    async fn append_until_new_key(&mut self) -> Result<()> {
        loop {
            if let Some((kv, continuation)) = self.pending.take() {
                let complete = self.append(kv, continuation)?;
                if complete {
                    // Version followed by unsplit; available right away.
                    return Ok(());
                }
            }
            match self.inner.on_next().await? {
                CursorResult::NoNext {
                    continuation,
                    reason,
                } => {
                    if self.reverse {
                        if let Some(acc) = &self.acc {
                            if acc.value.is_some() && !is_valid_reverse_stop(acc.index) {
                                return Err(Error::FoundSplitWithoutStart {
                                    index: acc.index,
                                    reverse: true,
                                    key: acc.record_subspace.raw_prefix().clone(),
                                });
                            }
                        }
                    }
                    self.inner_no_next_reason = Some(reason);
                    // With a record accumulated, the continuation already
                    // points at its last consumed entry; otherwise refresh.
                    if self.acc.as_ref().map_or(true, |acc| acc.value.is_none()) {
                        self.continuation = continuation;
                    }
                    return Ok(());
                }
                CursorResult::Next {
                    value: kv,
                    continuation,
                } => {
                    self.inner_no_next_reason = None;
                    self.limit_manager.try_record_scan();
                    let complete = self.append(kv, continuation)?;
                    if complete {
                        return Ok(());
                    }
                }
            }
        }
    }

    // Route one entry: start a record, extend the current one, or park the
    // entry as the start of the next record. Returns whether the current
    // record is complete.
    fn append(&mut self, kv: KeyValue, continuation: Option<Bytes>) -> Result<bool> {
        let Some(acc) = self.acc.as_mut() else {
            self.continuation = continuation;
            return self.append_first(kv);
        };
        if kv.key.starts_with(acc.record_subspace.raw_prefix()) {
            self.continuation = continuation;
            acc.append_next(kv, &mut self.size_info, self.reverse, self.old_version_format)
        } else {
            if self.reverse && !is_valid_reverse_stop(acc.index) {
                return Err(Error::FoundSplitWithoutStart {
                    index: acc.index,
                    reverse: true,
                    key: kv.key,
                });
            }
            self.pending = Some((kv, continuation));
            Ok(true)
        }
    }

    // Open a record from its first entry in scan order.
    fn append_first(&mut self, kv: KeyValue) -> Result<bool> {
        let key_tuple = self.subspace.unpack(&kv.key)?;
        let (primary_key, index) = split_suffix(key_tuple, &kv.key)?;
        let record_subspace = self.subspace.subspace(&primary_key);
        self.size_info.set(&kv.key, &kv.value);
        if index == UNSPLIT_RECORD {
            // Forward: the record's only entry. Reverse: a version entry may
            // still precede it in key order, so keep going.
            self.size_info.split = false;
            self.acc = Some(Accumulator {
                primary_key,
                record_subspace,
                value: Some(BytesMut::from(kv.value.as_ref())),
                version: None,
                index,
            });
            Ok(!self.reverse)
        } else if !self.reverse && index == RECORD_VERSION {
            if self.old_version_format {
                return Err(Error::OldVersionFormat { key: kv.key });
            }
            self.size_info.versioned_inline = true;
            let version = unpack_version(&kv.value)?;
            self.acc = Some(Accumulator {
                primary_key,
                record_subspace,
                value: None,
                version: Some(version),
                index,
            });
            Ok(false)
        } else if (self.reverse && index != RECORD_VERSION) || index == START_SPLIT_RECORD {
            // The first or last chunk of a split, depending on direction.
            self.size_info.split = true;
            self.acc = Some(Accumulator {
                primary_key,
                record_subspace,
                value: Some(BytesMut::from(kv.value.as_ref())),
                version: None,
                index,
            });
            Ok(false)
        } else {
            Err(Error::FoundSplitWithoutStart {
                index,
                reverse: self.reverse,
                key: kv.key,
            })
        }
    }

    fn finish_no_next(&mut self, reason: NoNextReason) -> CursorResult<RawRecord> {
        self.may_access_continuation = true;
        self.last_no_next_reason = Some(reason);
        CursorResult::NoNext {
            continuation: self.continuation.clone(),
            reason,
        }
    }

    // The inner source running dry beats any budget verdict; otherwise the
    // budget's out-of-band reason wins over an in-band inner reason.
    fn merge_no_next_reason(&self) -> NoNextReason {
        if let Some(NoNextReason::SourceExhausted) = self.inner_no_next_reason {
            return NoNextReason::SourceExhausted;
        }
        self.limit_manager
            .stopped_reason()
            .or(self.inner_no_next_reason)
            .unwrap_or(NoNextReason::SourceExhausted)
    }
}
