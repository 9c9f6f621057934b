pub mod bytes;
pub mod storage;
pub mod subspace;
pub mod tuple;

pub use bytes::BytesRange;
pub use storage::memory::{Database, Transaction};
pub use storage::{
    KeyValue, KeyValueIterator, ScanOptions, StorageError, StorageResult, TransactionRead,
};
pub use subspace::Subspace;
pub use tuple::{Element, Tuple, TupleError, Versionstamp};
