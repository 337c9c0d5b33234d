use crate::cluster::hkey;
use crate::dmap::env::{PutCondition, PutEnv};
use crate::dmap::errors::DmapError;
use crate::dmap::service::NodeContext;
use crate::storage_engine::{is_expired, Entry, StorageError, StoreConfig, StoreStats, TableStore};
use crate::utils::unix_nanos;
use dashmap::DashMap;
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;

/// A named logical map binding one storage engine to each owned partition
/// fragment.
///
/// Every fragment sits behind a read-write latch: puts, deletes and
/// exports on one partition are mutually exclusive, while reads run
/// concurrently with each other and observe a consistent chain snapshot.
/// The map applies conditional-write semantics on top of the engine;
/// routing to the partition owner is the caller's concern (the lock
/// protocol re-resolves the owner on every call).
pub struct DMap {
    name: String,
    ctx: Arc<NodeContext>,
    config: StoreConfig,
    fragments: DashMap<u64, Arc<RwLock<TableStore>>>,
    /// Back-reference to the shared handle this map lives behind, so lock
    /// contexts can carry the handle as a value instead of a borrow.
    handle: Weak<DMap>,
}

impl DMap {
    pub(crate) fn new(
        name: &str,
        ctx: Arc<NodeContext>,
        config: StoreConfig,
        handle: Weak<DMap>,
    ) -> Self {
        Self {
            name: name.to_string(),
            ctx,
            config,
            fragments: DashMap::new(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies a conditional put to the local fragment of the envelope's
    /// partition. Expired entries count as absent for both conditions.
    pub fn put(&self, env: PutEnv) -> Result<(), DmapError> {
        let fragment = self.fragment(env.hkey);
        let mut store = fragment.write().map_err(|_| DmapError::LatchPoisoned)?;

        let now = unix_nanos();
        match env.condition {
            PutCondition::IfNotFound => {
                if has_live_entry(&store, env.hkey, now) {
                    return Err(DmapError::KeyFound);
                }
            }
            PutCondition::IfFound => {
                if !has_live_entry(&store, env.hkey, now) {
                    return Err(DmapError::KeyNotFound);
                }
            }
            PutCondition::Always => {}
        }

        let record = Entry::new(&env.key, &env.value, env.timestamp)
            .with_ttl(env.absolute_ttl(now));
        let hint = store.put(env.hkey, &record)?;
        if hint.is_fragmented() {
            debug!(dmap = %self.name, key = %env.key, "put spilled into a new table");
        }
        Ok(())
    }

    /// Reads a key from the local fragment. An entry past its expiry
    /// deadline is treated as absent and deleted on the spot.
    pub fn get(&self, key: &str) -> Result<Entry, DmapError> {
        let hkey = hkey(&self.name, key);
        let fragment = self.fragment(hkey);
        let now = unix_nanos();

        {
            let store = fragment.read().map_err(|_| DmapError::LatchPoisoned)?;
            match store.get(hkey) {
                Ok(found) if !found.is_expired(now) => return Ok(found),
                Ok(_) => {}
                Err(StorageError::KeyNotFound) => return Err(DmapError::KeyNotFound),
                Err(other) => return Err(other.into()),
            }
        }

        // Reader-driven expiry: re-check under the write latch, since the
        // key may have been rewritten while the read latch was dropped.
        let mut store = fragment.write().map_err(|_| DmapError::LatchPoisoned)?;
        match store.get(hkey) {
            Ok(found) if !found.is_expired(unix_nanos()) => Ok(found),
            Ok(_) => {
                let hint = store.delete(hkey);
                if hint.is_fragmented() {
                    debug!(dmap = %self.name, key, "expiry delete crossed the garbage threshold");
                }
                Err(DmapError::KeyNotFound)
            }
            Err(StorageError::KeyNotFound) => Err(DmapError::KeyNotFound),
            Err(other) => Err(other.into()),
        }
    }

    /// Deletes a key from the local fragment. Absent keys are not an
    /// error.
    pub fn delete_key(&self, key: &str) -> Result<(), DmapError> {
        let hkey = hkey(&self.name, key);
        let fragment = self.fragment(hkey);
        let mut store = fragment.write().map_err(|_| DmapError::LatchPoisoned)?;
        let hint = store.delete(hkey);
        if hint.is_fragmented() {
            debug!(dmap = %self.name, key, "delete crossed the garbage threshold");
        }
        Ok(())
    }

    /// Drives compaction on every owned fragment until each chain has
    /// collapsed to a single table. Returns the number of fragments that
    /// needed work.
    pub fn compact(&self) -> Result<usize, DmapError> {
        let mut compacted = 0;
        for fragment in self.fragments.iter() {
            let mut store = fragment.write().map_err(|_| DmapError::LatchPoisoned)?;
            if store.num_tables() > 1 {
                compacted += 1;
                while !store.compact(unix_nanos()).map_err(DmapError::from)? {}
            }
        }
        Ok(compacted)
    }

    /// Memory accounting summed across owned fragments.
    pub fn stats(&self) -> Result<StoreStats, DmapError> {
        let mut total = StoreStats {
            allocated: 0,
            inuse: 0,
            garbage: 0,
            num_tables: 0,
        };
        for fragment in self.fragments.iter() {
            let store = fragment.read().map_err(|_| DmapError::LatchPoisoned)?;
            let stats = store.stats();
            total.allocated += stats.allocated;
            total.inuse += stats.inuse;
            total.garbage += stats.garbage;
            total.num_tables += stats.num_tables;
        }
        Ok(total)
    }

    pub(crate) fn ctx(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub(crate) fn shared_handle(&self) -> Option<Arc<DMap>> {
        self.handle.upgrade()
    }

    fn fragment(&self, hkey: u64) -> Arc<RwLock<TableStore>> {
        let partition = self.ctx.router.partition_id(hkey);
        self.fragments
            .entry(partition)
            .or_insert_with(|| Arc::new(RwLock::new(TableStore::new(self.config.clone()))))
            .clone()
    }
}

fn has_live_entry(store: &TableStore, hkey: u64, now: u64) -> bool {
    match store.get_ttl(hkey) {
        Ok(ttl) => !is_expired(ttl, now),
        Err(_) => false,
    }
}
