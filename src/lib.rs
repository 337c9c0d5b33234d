//! # tablekv
//!
//! The core of a partitioned in-memory key-value store. It provides:
//! - **Chained-table storage**: an append-only engine built from
//!   fixed-capacity tables, indexed by 64-bit hashed keys.
//! - **Compaction awareness**: writes and deletes report fragmentation as
//!   a soft signal instead of compacting in the background.
//! - **Export/import**: a single-table chain serializes to a byte blob
//!   and back, byte-exact.
//! - **Conditional writes**: `IfNotFound`/`IfFound` puts with absolute
//!   TTLs, enforced by readers.
//! - **Advisory locks**: token-verified, partition-routed lock/unlock
//!   with deadline-driven retry, built entirely on conditional puts.
//!
//! ## Example Usage
//! ```rust
//! use tablekv::{Entry, StoreConfig, TableStore};
//!
//! let mut store = TableStore::new(StoreConfig::default());
//! let hkey = tablekv::cluster::hkey("users", "alice");
//!
//! let _ = store.put(hkey, &Entry::new("alice", b"first", 1)).unwrap();
//! assert_eq!(store.get(hkey).unwrap().value(), b"first");
//!
//! // Overwrites shadow the old frame; deletes reclaim it as garbage.
//! let _ = store.put(hkey, &Entry::new("alice", b"second", 2)).unwrap();
//! assert_eq!(store.get(hkey).unwrap().value(), b"second");
//!
//! let _ = store.delete(hkey);
//! assert!(store.get(hkey).is_err());
//! ```
//!
//! ## Modules
//! - `storage_engine` - Tables, the chain engine and its wire transport.
//! - `cluster` - Partition routing and RPC seams consumed from the
//!   membership layer.
//! - `dmap` - Named maps, conditional puts and the advisory lock
//!   protocol.
//!
//! Locks are approximate under membership changes and are meant for
//! coordination rather than correctness-critical mutual exclusion; see
//! [`dmap::DMap::lock_with_timeout`] for the exact guarantees.

pub mod cluster;
pub mod dmap;
pub mod storage_engine;
mod utils;

pub use cluster::{hkey, Member, PartitionRouter, SingleNodeRouter};
pub use dmap::{DMap, DmapError, DmapService, LockContext, PutCondition, PutEnv};
pub use storage_engine::*;
