//! Cursor results, continuations, and the resumable key-value range scan.

use bytes::Bytes;
use common::{BytesRange, KeyValue, KeyValueIterator, ScanOptions, Transaction, TransactionRead};

use crate::error::Result;

/// Why a cursor produced no next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoNextReason {
    /// The underlying scan ran out of data; resuming will yield nothing.
    SourceExhausted,
    /// The cursor returned as many entries as its row limit allowed.
    ReturnLimitReached,
    /// The scan budget ran out; the scan stopped early out-of-band.
    ScanLimitReached,
}

impl NoNextReason {
    pub fn is_source_exhausted(&self) -> bool {
        matches!(self, NoNextReason::SourceExhausted)
    }

    /// Whether the stop was imposed by a budget rather than the data or a
    /// caller-requested row limit.
    pub fn is_out_of_band(&self) -> bool {
        matches!(self, NoNextReason::ScanLimitReached)
    }
}

/// One step of a cursor: either a value or a terminal no-next state.
///
/// Every result carries the continuation that resumes the scan just past it.
/// A `None` continuation means there is no position to resume from: the scan
/// either has not progressed or (with [`NoNextReason::SourceExhausted`]) is
/// finished for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorResult<T> {
    Next {
        value: T,
        continuation: Option<Bytes>,
    },
    NoNext {
        continuation: Option<Bytes>,
        reason: NoNextReason,
    },
}

impl<T> CursorResult<T> {
    pub fn has_next(&self) -> bool {
        matches!(self, CursorResult::Next { .. })
    }

    pub fn continuation(&self) -> Option<&Bytes> {
        match self {
            CursorResult::Next { continuation, .. } => continuation.as_ref(),
            CursorResult::NoNext { continuation, .. } => continuation.as_ref(),
        }
    }
}

/// A range scan over a transaction that yields one entry per step, each with
/// a continuation (the entry's key) from which a fresh cursor can resume.
pub struct KeyValueCursor<'t> {
    tx: &'t Transaction,
    range: BytesRange,
    reverse: bool,
    row_limit: Option<usize>,
    rows_returned: usize,
    iter: Option<Box<dyn KeyValueIterator + Send + 'static>>,
    last_key: Option<Bytes>,
    done: Option<NoNextReason>,
}

impl<'t> KeyValueCursor<'t> {
    /// Creates a cursor over `range` in the given direction.
    pub fn new(tx: &'t Transaction, range: BytesRange, reverse: bool) -> Self {
        Self {
            tx,
            range,
            reverse,
            row_limit: None,
            rows_returned: 0,
            iter: None,
            last_key: None,
            done: None,
        }
    }

    /// Limits the number of entries the cursor will return.
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Resumes just past a continuation from a previous scan.
    pub fn resume_from(mut self, continuation: Option<Bytes>) -> Self {
        if let Some(key) = continuation {
            self.range = if self.reverse {
                self.range.end_before(key)
            } else {
                self.range.begin_after(key)
            };
        }
        self
    }

    /// Returns the next entry, or the reason there is none.
    ///
    /// A terminal cursor keeps returning the same no-next result.
    pub async fn on_next(&mut self) -> Result<CursorResult<KeyValue>> {
        if let Some(reason) = self.done {
            return Ok(CursorResult::NoNext {
                continuation: self.terminal_continuation(reason),
                reason,
            });
        }
        if self
            .row_limit
            .is_some_and(|limit| self.rows_returned >= limit)
        {
            let reason = NoNextReason::ReturnLimitReached;
            self.done = Some(reason);
            return Ok(CursorResult::NoNext {
                continuation: self.last_key.clone(),
                reason,
            });
        }

        if self.iter.is_none() {
            let options = ScanOptions {
                reverse: self.reverse,
                limit: self.row_limit,
            };
            let iter = self.tx.scan_iter(self.range.clone(), options).await?;
            self.iter = Some(iter);
        }
        let iter = self.iter.as_mut().ok_or(crate::error::Error::Storage(
            "scan iterator unavailable".to_string(),
        ))?;

        match iter.next().await? {
            Some(kv) => {
                self.last_key = Some(kv.key.clone());
                self.rows_returned += 1;
                Ok(CursorResult::Next {
                    continuation: Some(kv.key.clone()),
                    value: kv,
                })
            }
            None => {
                let reason = NoNextReason::SourceExhausted;
                self.done = Some(reason);
                Ok(CursorResult::NoNext {
                    continuation: None,
                    reason,
                })
            }
        }
    }

    /// Releases the underlying scan.
    pub fn close(&mut self) {
        self.iter = None;
        if self.done.is_none() {
            self.done = Some(NoNextReason::SourceExhausted);
        }
    }

    fn terminal_continuation(&self, reason: NoNextReason) -> Option<Bytes> {
        match reason {
            NoNextReason::SourceExhausted => None,
            _ => self.last_key.clone(),
        }
    }
}
