use crate::storage_engine::digest::HKeyBuildHasher;
use crate::storage_engine::entry::{self, Entry};
use crate::storage_engine::errors::StorageError;
use std::collections::HashMap;

/// A fixed-capacity slab of serialized entry frames indexed by `HKey`.
///
/// The slab is append-only: frames are written at the `offset` cursor and
/// never moved. Deleting or overwriting a key leaves the old frame bytes in
/// place, unreachable, and accounts them as `garbage`. The invariant
/// `inuse + garbage == offset <= allocated` holds after every operation.
///
/// Any table but the newest in a chain is "frozen": it accepts deletes
/// (which only shrink the index and grow `garbage`) but never new puts.
/// Freezing is enforced by the engine, not the table.
#[derive(Debug)]
pub(crate) struct Table {
    memory: Box<[u8]>,
    hkeys: HashMap<u64, usize, HKeyBuildHasher>,
    allocated: usize,
    offset: usize,
    inuse: usize,
    garbage: usize,
}

impl Table {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            memory: vec![0u8; size].into_boxed_slice(),
            hkeys: HashMap::with_hasher(HKeyBuildHasher),
            allocated: size,
            offset: 0,
            inuse: 0,
            garbage: 0,
        }
    }

    /// Appends an encoded frame for `hkey`, replacing any prior version.
    ///
    /// Fails with `NotEnoughSpace` when the frame does not fit between the
    /// write cursor and capacity; no state changes in that case. A replaced
    /// prior frame stays in memory and is accounted as garbage.
    pub(crate) fn put(&mut self, hkey: u64, entry: &Entry) -> Result<(), StorageError> {
        let frame = entry.encode()?;
        self.put_raw(hkey, &frame)
    }

    pub(crate) fn put_raw(&mut self, hkey: u64, frame: &[u8]) -> Result<(), StorageError> {
        if self.offset + frame.len() > self.allocated {
            return Err(StorageError::NotEnoughSpace);
        }

        if let Some(prev_offset) = self.hkeys.remove(&hkey) {
            let prev_len = entry::frame_len(&self.memory[prev_offset..]);
            self.inuse -= prev_len;
            self.garbage += prev_len;
        }

        let start = self.offset;
        self.memory[start..start + frame.len()].copy_from_slice(frame);
        self.hkeys.insert(hkey, start);
        self.offset += frame.len();
        self.inuse += frame.len();
        Ok(())
    }

    /// Decoded read. `None` means "not in this table, check older ones".
    pub(crate) fn get(&self, hkey: u64) -> Option<Entry> {
        self.frame(hkey).map(Entry::decode)
    }

    /// Raw frame read, skipping the decode step. Useful for replication and
    /// table migration.
    pub(crate) fn get_raw(&self, hkey: u64) -> Option<&[u8]> {
        self.frame(hkey)
    }

    pub(crate) fn get_ttl(&self, hkey: u64) -> Option<u64> {
        self.frame(hkey).map(entry::frame_ttl)
    }

    pub(crate) fn get_key(&self, hkey: u64) -> Option<String> {
        self.frame(hkey).map(entry::frame_key)
    }

    /// Removes `hkey` from the index and accounts its frame as garbage.
    /// Returns `false` when the key is not in this table ("try older").
    pub(crate) fn delete(&mut self, hkey: u64) -> bool {
        let Some(offset) = self.hkeys.remove(&hkey) else {
            return false;
        };
        let len = entry::frame_len(&self.memory[offset..]);
        self.inuse -= len;
        self.garbage += len;
        true
    }

    /// In-place TTL rewrite. Only valid for the newest table in a chain;
    /// the engine rewrites frozen-table entries into the newest table
    /// instead.
    pub(crate) fn update_ttl(&mut self, hkey: u64, entry: &Entry) -> bool {
        let Some(&offset) = self.hkeys.get(&hkey) else {
            return false;
        };
        let len = entry::frame_len(&self.memory[offset..]);
        entry::patch_frame_ttl(
            &mut self.memory[offset..offset + len],
            entry.ttl(),
            entry.timestamp(),
        );
        true
    }

    pub(crate) fn contains(&self, hkey: u64) -> bool {
        self.hkeys.contains_key(&hkey)
    }

    pub(crate) fn hkeys(&self) -> impl Iterator<Item = u64> + '_ {
        self.hkeys.keys().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.hkeys.len()
    }

    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn inuse(&self) -> usize {
        self.inuse
    }

    pub(crate) fn garbage(&self) -> usize {
        self.garbage
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn memory_prefix(&self) -> &[u8] {
        &self.memory[..self.offset]
    }

    pub(crate) fn index(&self) -> &HashMap<u64, usize, HKeyBuildHasher> {
        &self.hkeys
    }

    /// Installs imported state. The caller has validated that every index
    /// offset points at a whole frame inside `memory[..offset]`.
    pub(crate) fn install(
        &mut self,
        hkeys: HashMap<u64, usize, HKeyBuildHasher>,
        memory: &[u8],
        offset: usize,
        inuse: usize,
        garbage: usize,
    ) {
        self.memory[..memory.len()].copy_from_slice(memory);
        self.hkeys = hkeys;
        self.offset = offset;
        self.inuse = inuse;
        self.garbage = garbage;
    }

    fn frame(&self, hkey: u64) -> Option<&[u8]> {
        let &offset = self.hkeys.get(&hkey)?;
        let len = entry::frame_len(&self.memory[offset..]);
        Some(&self.memory[offset..offset + len])
    }
}
