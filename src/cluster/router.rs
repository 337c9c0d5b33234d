use crate::cluster::member::Member;
use crate::storage_engine::digest::compute_hash;

/// Derives the stable 64-bit hashed key for a `(map name, key)` pair.
///
/// The name and key are hashed as one concatenated byte string, so the
/// same key in two differently named maps lands on different hkeys.
/// Collisions across distinct `(name, key)` pairs are treated as equal
/// keys by the storage layer; entry frames carry the original key string
/// so higher layers can detect them.
pub fn hkey(name: &str, key: &str) -> u64 {
    let mut buf = Vec::with_capacity(name.len() + key.len());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(key.as_bytes());
    compute_hash(&buf)
}

/// Pure routing surface consumed by the map and lock layers.
///
/// Owner lookups are synchronous and cheap, and the answer may change
/// between calls while partitions rebalance. The lock protocol tolerates
/// this by re-resolving the owner on every call rather than caching it in
/// a handle.
pub trait PartitionRouter: Send + Sync {
    fn partition_count(&self) -> u64;

    fn partition_id(&self, hkey: u64) -> u64 {
        hkey % self.partition_count()
    }

    /// Current owner of the partition holding `hkey`.
    fn owner(&self, hkey: u64) -> Member;

    /// The local member.
    fn this(&self) -> Member;
}

/// Router for a standalone deployment: one member owns everything.
#[derive(Debug, Clone)]
pub struct SingleNodeRouter {
    member: Member,
}

impl SingleNodeRouter {
    pub fn new(member: Member) -> Self {
        Self { member }
    }
}

impl PartitionRouter for SingleNodeRouter {
    fn partition_count(&self) -> u64 {
        1
    }

    fn owner(&self, _hkey: u64) -> Member {
        self.member.clone()
    }

    fn this(&self) -> Member {
        self.member.clone()
    }
}
