//! Record split codec over an ordered key-value store.
//!
//! A logical record — an opaque serialized byte blob plus an optional version
//! stamp — is stored as one or more contiguous entries sharing the packed
//! primary key as a common prefix. Each entry key ends in an integer suffix:
//!
//! ```text
//! prefix ∥ pack(-1)   version entry (optional, sorts before all data)
//! prefix ∥ pack(0)    the single entry of an unsplit record
//! prefix ∥ pack(1..)  contiguous chunks of a split record
//! ```
//!
//! Records no larger than [`SPLIT_RECORD_SIZE`] occupy a single unsplit
//! entry; larger records are chunked. A third, legacy layout stores an
//! unsplit record at the bare prefix with no suffix at all.
//!
//! # Key Concepts
//!
//! - **Writer** ([`save`] / [`delete`]): emits the entry set for a record,
//!   clearing no more of the old record than the previous sizes require.
//! - **Single-key reader** ([`load`] / [`exists`]): reassembles one record
//!   from a prefix-restricted range scan.
//! - **[`SplitRecordCursor`]**: reassembles a lazy sequence of records from
//!   an unbounded range scan in either direction, pausing only at record
//!   boundaries even when the scan budget runs out mid-record.
//!
//! Version stamps may be *incomplete* while their transaction is open: the
//! store fills in the 10 transaction bytes at commit. Readers surface such
//! versions from transaction-local state before they are durable.

mod config;
mod cursor;
mod error;
mod key;
mod limit;
mod model;
mod reader;
mod sizes;
mod stream;
mod version;
mod writer;

pub use config::{DeleteOptions, LoadOptions, SaveOptions, StreamOptions};
pub use cursor::{CursorResult, KeyValueCursor, NoNextReason};
pub use error::{Error, Result};
pub use key::{
    pack_data_key, pack_version, pack_version_key, parse_suffix, unpack_version, RECORD_VERSION,
    SPLIT_RECORD_SIZE, START_SPLIT_RECORD, UNSPLIT_RECORD,
};
pub use limit::{LimitManager, ScanLimits};
pub use model::RawRecord;
pub use reader::{exists, load};
pub use sizes::SizeInfo;
pub use stream::SplitRecordCursor;
pub use version::{RecordVersion, VERSION_LENGTH};
pub use writer::{delete, save};
