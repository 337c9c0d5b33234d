use crate::storage_engine::constants::*;
use crate::storage_engine::digest::HKeyBuildHasher;
use crate::storage_engine::entry::{self, Entry};
use crate::storage_engine::errors::{CompactionHint, StorageError};
use crate::storage_engine::table::Table;
use crate::storage_engine::transport::TableTransport;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Configuration for a [`TableStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity floor for newly allocated tables, in bytes.
    pub table_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_size: MIN_TABLE_SIZE,
        }
    }
}

/// Memory accounting summed across the table chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub allocated: usize,
    pub inuse: usize,
    pub garbage: usize,
    pub num_tables: usize,
}

/// Append-only in-memory storage engine built from a chain of
/// fixed-capacity tables.
///
/// The chain is ordered oldest-first; writes go only to the newest table
/// and reads scan newest to oldest, so a newer frame always shadows an
/// older one for the same `HKey`. When the newest table cannot hold a
/// frame, a larger table is appended and the write retried; the successful
/// write then carries a [`CompactionHint::Fragmented`] so an external
/// actor knows a merge pass would help. The engine itself never compacts
/// in the background and stays correct if nothing ever drives
/// [`TableStore::compact`], at the cost of unbounded memory.
///
/// The engine is not internally synchronized. Callers serialize writers
/// against each other and against readers (the map layer wraps each
/// partition fragment in a read-write latch).
#[derive(Debug)]
pub struct TableStore {
    tables: Vec<Table>,
    config: StoreConfig,
}

impl TableStore {
    pub fn new(config: StoreConfig) -> Self {
        let first = Table::new(config.table_size);
        Self {
            tables: vec![first],
            config,
        }
    }

    /// A fresh, empty engine with the same configuration.
    pub fn fork(&self) -> TableStore {
        TableStore::new(self.config.clone())
    }

    /// Sets the value for `hkey`, overwriting any previous value.
    ///
    /// `Fragmented` in the success value means the put spilled into a
    /// newly allocated table; the put itself succeeded.
    pub fn put(&mut self, hkey: u64, entry: &Entry) -> Result<CompactionHint, StorageError> {
        let frame = entry.encode()?;
        self.put_frame(hkey, &frame)
    }

    /// Sets the already-encoded frame for `hkey`. Skipping the encode step
    /// is useful when migrating frames between tables or applying
    /// replicated writes.
    pub fn put_raw(&mut self, hkey: u64, frame: &[u8]) -> Result<CompactionHint, StorageError> {
        self.put_frame(hkey, frame)
    }

    /// Gets the value for `hkey`, scanning the chain newest to oldest.
    pub fn get(&self, hkey: u64) -> Result<Entry, StorageError> {
        for table in self.tables.iter().rev() {
            if let Some(found) = table.get(hkey) {
                return Ok(found);
            }
        }
        Err(StorageError::KeyNotFound)
    }

    /// Raw-frame variant of [`TableStore::get`].
    pub fn get_raw(&self, hkey: u64) -> Result<&[u8], StorageError> {
        for table in self.tables.iter().rev() {
            if let Some(frame) = table.get_raw(hkey) {
                return Ok(frame);
            }
        }
        Err(StorageError::KeyNotFound)
    }

    pub fn get_ttl(&self, hkey: u64) -> Result<u64, StorageError> {
        for table in self.tables.iter().rev() {
            if let Some(ttl) = table.get_ttl(hkey) {
                return Ok(ttl);
            }
        }
        Err(StorageError::KeyNotFound)
    }

    pub fn get_key(&self, hkey: u64) -> Result<String, StorageError> {
        for table in self.tables.iter().rev() {
            if let Some(key) = table.get_key(hkey) {
                return Ok(key);
            }
        }
        Err(StorageError::KeyNotFound)
    }

    /// Index-only existence probe across the chain.
    pub fn check(&self, hkey: u64) -> bool {
        self.tables.iter().rev().any(|table| table.contains(hkey))
    }

    /// Deletes `hkey` from every table that holds it, so a stale
    /// frozen-table copy cannot resurrect after the newest copy is gone.
    ///
    /// When the deletion leaves a single-table chain past the garbage
    /// threshold, an empty table is appended so a compaction cycle can
    /// drain the fragmented one; the returned hint is `Fragmented`.
    pub fn delete(&mut self, hkey: u64) -> CompactionHint {
        for table in self.tables.iter_mut().rev() {
            table.delete(hkey);
        }

        if self.tables.len() != 1 {
            return CompactionHint::None;
        }
        let table = &self.tables[0];
        if table.allocated() as f64 * MAX_GARBAGE_RATIO <= table.garbage() as f64 {
            let size = self.config.table_size.max(self.inuse() * 2);
            self.tables.push(Table::new(size));
            return CompactionHint::Fragmented;
        }
        CompactionHint::None
    }

    /// Updates expiry for an existing key. The newest table is patched in
    /// place; a frame living only in a frozen table is rewritten into the
    /// newest table instead, since frozen tables accept no writes.
    pub fn update_ttl(&mut self, hkey: u64, entry: &Entry) -> Result<CompactionHint, StorageError> {
        let newest = self.tables.len() - 1;
        if self.tables[newest].update_ttl(hkey, entry) {
            return Ok(CompactionHint::None);
        }

        for idx in (0..newest).rev() {
            let Some(frame) = self.tables[idx].get_raw(hkey) else {
                continue;
            };
            let mut frame = frame.to_vec();
            entry::patch_frame_ttl(&mut frame, entry.ttl(), entry.timestamp());
            for table in self.tables.iter_mut() {
                table.delete(hkey);
            }
            return self.put_frame(hkey, &frame);
        }
        Err(StorageError::KeyNotFound)
    }

    /// Calls `f` for every `(hkey, entry)` pair, newest table first, until
    /// `f` returns `false`. A key living in several tables is visited once
    /// per table (newer first); callers that need uniqueness track seen
    /// hkeys themselves.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(u64, Entry) -> bool,
    {
        for table in self.tables.iter().rev() {
            for hkey in table.hkeys() {
                if let Some(found) = table.get(hkey) {
                    if !f(hkey, found) {
                        return;
                    }
                }
            }
        }
    }

    /// [`TableStore::range`] restricted to keys matching `pattern`.
    pub fn match_on_key<F>(&self, pattern: &str, mut f: F) -> Result<(), StorageError>
    where
        F: FnMut(u64, Entry) -> bool,
    {
        let matcher = Regex::new(pattern)?;
        for table in self.tables.iter().rev() {
            for hkey in table.hkeys() {
                let Some(key) = table.get_key(hkey) else {
                    continue;
                };
                if !matcher.is_match(&key) {
                    continue;
                }
                if let Some(found) = table.get(hkey) {
                    if !f(hkey, found) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Serializes the engine into a transport blob.
    ///
    /// Only valid while the chain holds exactly one table; otherwise the
    /// call fails with `Fragmented` and should be retried after a
    /// compaction cycle collapses the chain.
    pub fn export(&self) -> Result<Vec<u8>, StorageError> {
        if self.tables.len() != 1 {
            return Err(StorageError::Fragmented);
        }
        let table = &self.tables[0];
        let transport = TableTransport {
            hkeys: table
                .index()
                .iter()
                .map(|(&hkey, &offset)| (hkey, offset as u64))
                .collect(),
            memory: table.memory_prefix().to_vec(),
            offset: table.offset() as u64,
            allocated: table.allocated() as u64,
            inuse: table.inuse() as u64,
            garbage: table.garbage() as u64,
        };
        Ok(bincode::serialize(&transport)?)
    }

    /// Rebuilds an engine from an exported blob. The result holds exactly
    /// one table with the counters restored byte-exact.
    pub fn import(&self, data: &[u8]) -> Result<TableStore, StorageError> {
        let transport: TableTransport = bincode::deserialize(data)?;
        let offset = transport.offset as usize;
        let allocated = transport.allocated as usize;

        if offset > allocated
            || transport.memory.len() != offset
            || transport.inuse as usize + transport.garbage as usize != offset
        {
            return Err(StorageError::MalformedTransport);
        }
        let mut hkeys: HashMap<u64, usize, HKeyBuildHasher> =
            HashMap::with_capacity_and_hasher(transport.hkeys.len(), HKeyBuildHasher);
        for (&hkey, &frame_offset) in &transport.hkeys {
            let frame_offset = frame_offset as usize;
            if frame_offset + ENTRY_HEADER_SIZE > offset
                || frame_offset + entry::frame_len(&transport.memory[frame_offset..]) > offset
            {
                return Err(StorageError::MalformedTransport);
            }
            hkeys.insert(hkey, frame_offset);
        }

        let mut fresh = TableStore::new(StoreConfig {
            table_size: allocated,
        });
        fresh.tables[0].install(
            hkeys,
            &transport.memory,
            offset,
            transport.inuse as usize,
            transport.garbage as usize,
        );
        Ok(fresh)
    }

    /// One caller-driven compaction step: drains the oldest frozen table
    /// by migrating its live, unshadowed frames into the newest table and
    /// drops it. Expired frames are left behind. Returns `true` once the
    /// chain has collapsed to a single table.
    ///
    /// `now` is the current time in nanoseconds since the epoch, used to
    /// recognize expired frames.
    pub fn compact(&mut self, now: u64) -> Result<bool, StorageError> {
        if self.tables.len() <= 1 {
            return Ok(true);
        }

        let frozen = self.tables.remove(0);
        let mut migrated = 0usize;
        for hkey in frozen.hkeys() {
            if self.check(hkey) {
                continue;
            }
            let Some(frame) = frozen.get_raw(hkey) else {
                continue;
            };
            if entry::is_expired(entry::frame_ttl(frame), now) {
                continue;
            }
            let _ = self.put_frame(hkey, frame)?;
            migrated += 1;
        }
        debug!(
            migrated,
            remaining_tables = self.tables.len(),
            "drained frozen table"
        );
        Ok(self.tables.len() == 1)
    }

    /// Key count summed across the chain's index maps.
    pub fn len(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total live bytes across the chain.
    pub fn inuse(&self) -> usize {
        self.tables.iter().map(Table::inuse).sum()
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            allocated: 0,
            inuse: 0,
            garbage: 0,
            num_tables: self.tables.len(),
        };
        for table in &self.tables {
            stats.allocated += table.allocated();
            stats.inuse += table.inuse();
            stats.garbage += table.garbage();
        }
        stats
    }

    pub fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn put_frame(&mut self, hkey: u64, frame: &[u8]) -> Result<CompactionHint, StorageError> {
        let mut hint = CompactionHint::None;
        loop {
            // Writes only ever land in the newest table.
            let result = match self.tables.last_mut() {
                Some(table) => table.put_raw(hkey, frame),
                None => Err(StorageError::NotEnoughSpace),
            };
            match result {
                Ok(()) => return Ok(hint),
                Err(StorageError::NotEnoughSpace) => {
                    // The frame-length floor keeps a frame larger than
                    // twice the live bytes from looping forever.
                    let size = self
                        .config
                        .table_size
                        .max(self.inuse() * 2)
                        .max(frame.len());
                    self.tables.push(Table::new(size));
                    hint = CompactionHint::Fragmented;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

impl Default for TableStore {
    fn default() -> Self {
        TableStore::new(StoreConfig::default())
    }
}
