use crate::storage_engine::entry::Entry;
use crate::storage_engine::errors::{CompactionHint, StorageError};
use crate::storage_engine::table_store::{StoreStats, TableStore};

/// The abstract surface a partition fragment requires from its storage
/// engine. [`TableStore`] is the chained-table implementation; other
/// variants (on-disk, tiered) plug in behind the same seam.
pub trait StorageEngine {
    fn put(&mut self, hkey: u64, entry: &Entry) -> Result<CompactionHint, StorageError>;

    fn get(&self, hkey: u64) -> Result<Entry, StorageError>;

    fn delete(&mut self, hkey: u64) -> CompactionHint;

    /// Visits every `(hkey, entry)` pair until the callback returns
    /// `false`. Keys shadowed across tables may be visited more than once,
    /// newest version first.
    fn range(&self, f: &mut dyn FnMut(u64, Entry) -> bool);

    fn match_on_key(
        &self,
        pattern: &str,
        f: &mut dyn FnMut(u64, Entry) -> bool,
    ) -> Result<(), StorageError>;

    fn export(&self) -> Result<Vec<u8>, StorageError>;

    fn import(&self, data: &[u8]) -> Result<Self, StorageError>
    where
        Self: Sized;

    fn stats(&self) -> StoreStats;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh, empty engine with the same configuration.
    fn fork(&self) -> Self
    where
        Self: Sized;

    fn close(&mut self) -> Result<(), StorageError>;
}

impl StorageEngine for TableStore {
    fn put(&mut self, hkey: u64, entry: &Entry) -> Result<CompactionHint, StorageError> {
        TableStore::put(self, hkey, entry)
    }

    fn get(&self, hkey: u64) -> Result<Entry, StorageError> {
        TableStore::get(self, hkey)
    }

    fn delete(&mut self, hkey: u64) -> CompactionHint {
        TableStore::delete(self, hkey)
    }

    fn range(&self, f: &mut dyn FnMut(u64, Entry) -> bool) {
        TableStore::range(self, f)
    }

    fn match_on_key(
        &self,
        pattern: &str,
        f: &mut dyn FnMut(u64, Entry) -> bool,
    ) -> Result<(), StorageError> {
        TableStore::match_on_key(self, pattern, f)
    }

    fn export(&self) -> Result<Vec<u8>, StorageError> {
        TableStore::export(self)
    }

    fn import(&self, data: &[u8]) -> Result<Self, StorageError> {
        TableStore::import(self, data)
    }

    fn stats(&self) -> StoreStats {
        TableStore::stats(self)
    }

    fn len(&self) -> usize {
        TableStore::len(self)
    }

    fn fork(&self) -> Self {
        TableStore::fork(self)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        TableStore::close(self)
    }
}
