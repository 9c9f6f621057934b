//! In-memory ordered store with buffered transactions.
//!
//! The store keeps committed data in a `BTreeMap` behind an `RwLock`.
//! Transactions buffer mutations locally and publish them atomically at
//! commit; reads within a transaction merge the committed state with the
//! transaction's own buffered writes and clears.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{
    KeyValue, KeyValueIterator, ScanOptions, StorageError, StorageResult, TransactionRead,
};
use crate::BytesRange;

/// Length of the store-assigned portion of a versionstamp: an 8-byte
/// big-endian commit version followed by a 2-byte batch order.
pub const TRANSACTION_VERSION_LENGTH: usize = 10;

/// Returns the 10 transaction-version bytes a commit at `commit_version`
/// splices into versionstamped values.
pub fn transaction_version(commit_version: u64) -> [u8; TRANSACTION_VERSION_LENGTH] {
    let mut bytes = [0u8; TRANSACTION_VERSION_LENGTH];
    bytes[..8].copy_from_slice(&commit_version.to_be_bytes());
    // Single-writer store: batch order is always zero
    bytes
}

#[derive(Default)]
struct DatabaseState {
    data: BTreeMap<Bytes, Bytes>,
    commit_version: u64,
}

/// An ordered in-memory key-value store.
///
/// Cloning shares the underlying state; all mutation goes through
/// [`Transaction`]s obtained from [`Database::transaction`].
#[derive(Clone, Default)]
pub struct Database {
    state: Arc<RwLock<DatabaseState>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new transaction against the current committed state.
    pub fn transaction(&self) -> Transaction {
        Transaction {
            db: Arc::clone(&self.state),
            state: RwLock::new(TransactionState::default()),
        }
    }

    /// Returns the most recently assigned commit version.
    pub fn commit_version(&self) -> StorageResult<u64> {
        let state = self
            .state
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(state.commit_version)
    }
}

#[derive(Default)]
struct TransactionState {
    writes: BTreeMap<Bytes, Bytes>,
    version_writes: BTreeMap<Bytes, Bytes>,
    cleared: Vec<BytesRange>,
    local_versions: HashMap<Bytes, u16>,
    committed: bool,
}

impl TransactionState {
    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }
}

/// A transaction buffering mutations against a [`Database`].
///
/// Mutations are synchronous (they only touch the transaction's buffers);
/// reads are asynchronous and observe committed state merged with this
/// transaction's buffered effects. Pending versionstamped values are the one
/// exception: their target keys read as absent until commit resolves them.
pub struct Transaction {
    db: Arc<RwLock<DatabaseState>>,
    state: RwLock<TransactionState>,
}

impl Transaction {
    /// Buffers a plain write.
    pub fn set(&self, key: Bytes, value: Bytes) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.version_writes.remove(&key);
        state.writes.insert(key, value);
        Ok(())
    }

    /// Buffers a single-key clear.
    pub fn clear(&self, key: Bytes) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.writes.remove(&key);
        state.version_writes.remove(&key);
        state.cleared.push(BytesRange::new(
            Bound::Included(key.clone()),
            Bound::Included(key),
        ));
        Ok(())
    }

    /// Buffers a range clear. Earlier buffered writes inside the range are
    /// dropped; later writes win over the clear.
    pub fn clear_range(&self, range: BytesRange) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.writes.retain(|key, _| !range.contains(key));
        state.version_writes.retain(|key, _| !range.contains(key));
        state.cleared.push(range);
        Ok(())
    }

    /// Buffers a versionstamped-value mutation.
    ///
    /// `value` must carry a trailing 4-byte little-endian offset pointing at
    /// the placeholder transaction-version bytes; commit splices the resolved
    /// stamp there and drops the tail.
    pub fn set_versionstamped_value(&self, key: Bytes, value: Bytes) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.writes.remove(&key);
        state.version_writes.insert(key, value);
        Ok(())
    }

    /// Drops a pending versionstamped-value mutation for `key`, if any.
    pub fn remove_version_mutation(&self, key: &[u8]) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.version_writes.remove(key);
        Ok(())
    }

    /// Records the local version ordinal for a record key.
    pub fn add_to_local_version_cache(&self, key: Bytes, local_version: u16) -> StorageResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        state.local_versions.insert(key, local_version);
        Ok(())
    }

    /// Looks up the local version ordinal registered for a record key.
    pub fn get_local_version(&self, key: &[u8]) -> StorageResult<Option<u16>> {
        let state = self
            .state
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(state.local_versions.get(key).copied())
    }

    /// Commits buffered mutations atomically, resolving versionstamped
    /// values with the assigned commit version. Returns that version.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn commit(&self) -> StorageResult<u64> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        if state.committed {
            return Err(StorageError::Internal(
                "transaction already committed".to_string(),
            ));
        }
        state.committed = true;

        let mut db = self
            .db
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        db.commit_version += 1;
        let commit_version = db.commit_version;
        let stamp = transaction_version(commit_version);

        for range in &state.cleared {
            let doomed: Vec<Bytes> = db
                .data
                .range((range.start.clone(), range.end.clone()))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                db.data.remove(&key);
            }
        }
        for (key, value) in &state.writes {
            db.data.insert(key.clone(), value.clone());
        }
        for (key, value) in &state.version_writes {
            let resolved = resolve_versionstamped_value(value, &stamp)?;
            db.data.insert(key.clone(), resolved);
        }

        Ok(commit_version)
    }

    fn merged_snapshot(&self, range: &BytesRange) -> StorageResult<Vec<KeyValue>> {
        let state = self
            .state
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        let db = self
            .db
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut merged: BTreeMap<Bytes, Bytes> = db
            .data
            .range((range.start.clone(), range.end.clone()))
            .filter(|(key, _)| {
                !state.is_cleared(key) && !state.version_writes.contains_key(*key)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in state
            .writes
            .range((range.start.clone(), range.end.clone()))
        {
            merged.insert(key.clone(), value.clone());
        }

        Ok(merged
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect())
    }
}

/// Splices the resolved transaction version into a pending versionstamped
/// value and strips the trailing offset.
fn resolve_versionstamped_value(
    value: &Bytes,
    stamp: &[u8; TRANSACTION_VERSION_LENGTH],
) -> StorageResult<Bytes> {
    if value.len() < 4 {
        return Err(StorageError::Storage(
            "versionstamped value too short for offset tail".to_string(),
        ));
    }
    let (body, tail) = value.split_at(value.len() - 4);
    let offset = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as usize;
    if offset + TRANSACTION_VERSION_LENGTH > body.len() {
        return Err(StorageError::Storage(format!(
            "versionstamp offset {} out of bounds for value of {} bytes",
            offset,
            body.len()
        )));
    }
    let mut resolved = BytesMut::from(body);
    resolved[offset..offset + TRANSACTION_VERSION_LENGTH].copy_from_slice(stamp);
    Ok(resolved.freeze())
}

#[async_trait]
impl TransactionRead for Transaction {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Bytes>> {
        {
            let state = self.state.read().map_err(|e| {
                StorageError::Internal(format!("Failed to acquire read lock: {}", e))
            })?;
            if let Some(value) = state.writes.get(&key) {
                return Ok(Some(value.clone()));
            }
            if state.version_writes.contains_key(&key) || state.is_cleared(&key) {
                return Ok(None);
            }
        }
        let db = self
            .db
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(db.data.get(&key).cloned())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
        options: ScanOptions,
    ) -> StorageResult<Box<dyn KeyValueIterator + Send + 'static>> {
        let mut entries = self.merged_snapshot(&range)?;
        if options.reverse {
            entries.reverse();
        }
        if let Some(limit) = options.limit {
            entries.truncate(limit);
        }
        Ok(Box::new(MemoryIterator { entries, index: 0 }))
    }
}

struct MemoryIterator {
    entries: Vec<KeyValue>,
    index: usize,
}

#[async_trait]
impl KeyValueIterator for MemoryIterator {
    async fn next(&mut self) -> StorageResult<Option<KeyValue>> {
        if self.index >= self.entries.len() {
            Ok(None)
        } else {
            let entry = self.entries[self.index].clone();
            self.index += 1;
            Ok(Some(entry))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    async fn collect(tx: &Transaction, range: BytesRange, options: ScanOptions) -> Vec<KeyValue> {
        let mut iter = tx.scan_iter(range, options).await.unwrap();
        let mut entries = vec![];
        while let Some(entry) = iter.next().await.unwrap() {
            entries.push(entry);
        }
        entries
    }

    #[tokio::test]
    async fn should_read_own_writes_before_commit() {
        // given
        let db = Database::new();
        let tx = db.transaction();

        // when
        tx.set(b("k"), b("v")).unwrap();

        // then
        assert_eq!(tx.get(b("k")).await.unwrap(), Some(b("v")));
    }

    #[tokio::test]
    async fn should_not_publish_writes_until_commit() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("k"), b("v")).unwrap();

        // when
        let other = db.transaction();

        // then
        assert_eq!(other.get(b("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_publish_writes_at_commit() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("k"), b("v")).unwrap();

        // when
        tx.commit().await.unwrap();

        // then
        let other = db.transaction();
        assert_eq!(other.get(b("k")).await.unwrap(), Some(b("v")));
    }

    #[tokio::test]
    async fn should_mask_committed_keys_inside_cleared_range() {
        // given
        let db = Database::new();
        let setup = db.transaction();
        setup.set(b("a1"), b("1")).unwrap();
        setup.set(b("a2"), b("2")).unwrap();
        setup.set(b("b1"), b("3")).unwrap();
        setup.commit().await.unwrap();

        // when
        let tx = db.transaction();
        tx.clear_range(BytesRange::prefix(b("a"))).unwrap();

        // then
        assert_eq!(tx.get(b("a1")).await.unwrap(), None);
        assert_eq!(tx.get(b("a2")).await.unwrap(), None);
        assert_eq!(tx.get(b("b1")).await.unwrap(), Some(b("3")));
    }

    #[tokio::test]
    async fn should_let_later_write_win_over_earlier_clear() {
        // given
        let db = Database::new();
        let setup = db.transaction();
        setup.set(b("a1"), b("old")).unwrap();
        setup.commit().await.unwrap();

        // when
        let tx = db.transaction();
        tx.clear_range(BytesRange::prefix(b("a"))).unwrap();
        tx.set(b("a1"), b("new")).unwrap();
        tx.commit().await.unwrap();

        // then
        let check = db.transaction();
        assert_eq!(check.get(b("a1")).await.unwrap(), Some(b("new")));
    }

    #[tokio::test]
    async fn should_drop_buffered_writes_covered_by_later_clear() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("a1"), b("1")).unwrap();

        // when
        tx.clear_range(BytesRange::prefix(b("a"))).unwrap();
        tx.commit().await.unwrap();

        // then
        let check = db.transaction();
        assert_eq!(check.get(b("a1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_scan_merged_view_in_order() {
        // given
        let db = Database::new();
        let setup = db.transaction();
        setup.set(b("a"), b("committed-a")).unwrap();
        setup.set(b("c"), b("committed-c")).unwrap();
        setup.commit().await.unwrap();

        let tx = db.transaction();
        tx.set(b("b"), b("buffered-b")).unwrap();
        tx.set(b("c"), b("buffered-c")).unwrap();

        // when
        let entries = collect(&tx, BytesRange::unbounded(), ScanOptions::forward()).await;

        // then
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, b("a"));
        assert_eq!(entries[1].key, b("b"));
        assert_eq!(entries[2].value, b("buffered-c"));
    }

    #[tokio::test]
    async fn should_scan_in_reverse_order() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("a"), b("1")).unwrap();
        tx.set(b("b"), b("2")).unwrap();
        tx.set(b("c"), b("3")).unwrap();

        // when
        let entries = collect(&tx, BytesRange::unbounded(), ScanOptions::reverse()).await;

        // then
        assert_eq!(entries[0].key, b("c"));
        assert_eq!(entries[1].key, b("b"));
        assert_eq!(entries[2].key, b("a"));
    }

    #[tokio::test]
    async fn should_truncate_scan_at_limit() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("a"), b("1")).unwrap();
        tx.set(b("b"), b("2")).unwrap();
        tx.set(b("c"), b("3")).unwrap();

        // when
        let entries = collect(
            &tx,
            BytesRange::unbounded(),
            ScanOptions::forward().with_limit(2),
        )
        .await;

        // then
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].key, b("b"));
    }

    #[tokio::test]
    async fn should_hide_pending_versionstamped_value_from_reads() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let mut value = vec![0x33];
        value.extend_from_slice(&[0xFF; 10]);
        value.extend_from_slice(&[0x00, 0x07]);
        value.extend_from_slice(&1u32.to_le_bytes());

        // when
        tx.set_versionstamped_value(b("k"), Bytes::from(value)).unwrap();

        // then
        assert_eq!(tx.get(b("k")).await.unwrap(), None);
        assert!(collect(&tx, BytesRange::unbounded(), ScanOptions::forward())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn should_resolve_versionstamped_value_at_commit() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let mut value = vec![0x33];
        value.extend_from_slice(&[0xFF; 10]);
        value.extend_from_slice(&[0x00, 0x07]);
        value.extend_from_slice(&1u32.to_le_bytes());
        tx.set_versionstamped_value(b("k"), Bytes::from(value)).unwrap();

        // when
        let commit_version = tx.commit().await.unwrap();

        // then
        let check = db.transaction();
        let resolved = check.get(b("k")).await.unwrap().unwrap();
        assert_eq!(resolved.len(), 13);
        assert_eq!(resolved[0], 0x33);
        assert_eq!(&resolved[1..11], &transaction_version(commit_version));
        assert_eq!(&resolved[11..], &[0x00, 0x07]);
    }

    #[tokio::test]
    async fn should_drop_removed_version_mutation() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        let mut value = vec![0x33];
        value.extend_from_slice(&[0xFF; 10]);
        value.extend_from_slice(&[0x00, 0x07]);
        value.extend_from_slice(&1u32.to_le_bytes());
        tx.set_versionstamped_value(b("k"), Bytes::from(value)).unwrap();

        // when
        tx.remove_version_mutation(b("k").as_ref()).unwrap();
        tx.commit().await.unwrap();

        // then
        let check = db.transaction();
        assert_eq!(check.get(b("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_track_local_version_cache() {
        // given
        let db = Database::new();
        let tx = db.transaction();

        // when
        tx.add_to_local_version_cache(b("pk"), 7).unwrap();

        // then
        assert_eq!(tx.get_local_version(b("pk").as_ref()).unwrap(), Some(7));
        assert_eq!(tx.get_local_version(b("other").as_ref()).unwrap(), None);
    }

    #[tokio::test]
    async fn should_reject_double_commit() {
        // given
        let db = Database::new();
        let tx = db.transaction();
        tx.set(b("k"), b("v")).unwrap();
        tx.commit().await.unwrap();

        // when
        let result = tx.commit().await;

        // then
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_assign_monotonic_commit_versions() {
        // given
        let db = Database::new();

        // when
        let v1 = db.transaction().commit().await.unwrap();
        let v2 = db.transaction().commit().await.unwrap();

        // then
        assert!(v2 > v1);
        assert_eq!(db.commit_version().unwrap(), v2);
    }
}
