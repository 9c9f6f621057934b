//! Byte utilities for key encoding and range queries.

use bytes::{Bytes, BytesMut};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::ops::{Bound, RangeBounds};

/// Computes the lexicographic successor of a byte sequence.
///
/// Returns the smallest byte sequence that is strictly greater than every key
/// starting with the input, or `None` if no such sequence exists (empty input
/// or all `0xFF` bytes).
///
/// This is what turns a prefix into an exclusive upper bound: all keys with
/// prefix `p` fall in `[p, lex_increment(p))`.
pub(crate) fn lex_increment(data: &[u8]) -> Option<Bytes> {
    if data.is_empty() {
        return None;
    }

    let mut result = BytesMut::from(data);

    // Work backwards, looking for a byte we can increment
    while let Some(last) = result.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(result.freeze());
        }
        // Last byte is 0xFF, truncate it and try the previous byte
        result.truncate(result.len() - 1);
    }

    // All bytes were 0xFF, no valid increment exists
    None
}

/// A range over byte sequences, used for key range queries.
#[derive(Clone, Debug)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// Creates a range that includes all keys with the given prefix.
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            Self::unbounded()
        } else {
            match lex_increment(&prefix) {
                Some(end) => Self {
                    start: Included(prefix),
                    end: Excluded(end),
                },
                None => Self {
                    start: Included(prefix),
                    end: Unbounded,
                },
            }
        }
    }

    pub fn contains(&self, k: &[u8]) -> bool {
        (match &self.start {
            Included(s) => k >= s,
            Excluded(s) => k > s,
            Unbounded => true,
        }) && (match &self.end {
            Included(e) => k <= e,
            Excluded(e) => k < e,
            Unbounded => true,
        })
    }

    /// Creates a range that scans everything.
    pub fn unbounded() -> Self {
        Self {
            start: Unbounded,
            end: Unbounded,
        }
    }

    /// Narrows this range to start strictly after `key`.
    ///
    /// Used to resume a forward scan from a continuation.
    pub fn begin_after(self, key: Bytes) -> Self {
        let tighter = match &self.start {
            Included(s) | Excluded(s) => key >= *s,
            Unbounded => true,
        };
        if tighter {
            Self {
                start: Excluded(key),
                end: self.end,
            }
        } else {
            self
        }
    }

    /// Narrows this range to end strictly before `key`.
    ///
    /// Used to resume a reverse scan from a continuation.
    pub fn end_before(self, key: Bytes) -> Self {
        let tighter = match &self.end {
            Included(e) | Excluded(e) => key <= *e,
            Unbounded => true,
        };
        if tighter {
            Self {
                start: self.start,
                end: Excluded(key),
            }
        } else {
            self
        }
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }
    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
