//! Record versions: 12-byte commit stamps attached to records.

use common::tuple::Versionstamp;

/// Length of a record version in bytes.
pub const VERSION_LENGTH: usize = 12;

/// A version stamp attached to a record.
///
/// A *complete* version carries the 10 transaction bytes the store assigned
/// at commit plus a 2-byte local ordinal. An *incomplete* version exists only
/// inside an open transaction: the transaction bytes are unresolved and only
/// the local ordinal is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordVersion {
    stamp: Versionstamp,
}

impl RecordVersion {
    /// Creates a complete version from resolved transaction bytes and a local
    /// ordinal.
    pub fn complete(transaction_version: [u8; 10], local_version: u16) -> Self {
        Self {
            stamp: Versionstamp::complete(transaction_version, local_version),
        }
    }

    /// Creates an incomplete version carrying only the local ordinal.
    pub fn incomplete(local_version: u16) -> Self {
        Self {
            stamp: Versionstamp::incomplete(local_version),
        }
    }

    /// Reinterprets a stamp read back from the store; always complete.
    pub fn from_versionstamp(stamp: Versionstamp) -> Self {
        Self {
            stamp: Versionstamp::from_bytes(*stamp.as_bytes()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stamp.is_complete()
    }

    /// The 16-bit ordinal identifying this version within its transaction.
    pub fn local_version(&self) -> u16 {
        self.stamp.user_version()
    }

    /// The versionstamp element packed into the version entry's value.
    pub fn to_versionstamp(&self) -> Versionstamp {
        self.stamp
    }
}
