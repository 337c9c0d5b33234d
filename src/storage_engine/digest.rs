use std::hash::{BuildHasher, Hasher};
use xxhash_rust::xxh3::xxh3_64;

mod compute_hash;
pub use compute_hash::*;

/// Hasher for maps keyed by `HKey`.
///
/// Table index maps and the engine's bookkeeping structures are keyed by
/// values that are already XXH3 hashes of `(map name, key)`. This hasher
/// runs XXH3 over those eight bytes, which keeps the index maps on the
/// same hash family as the keys themselves instead of siphash-ing
/// already-uniform input.
#[derive(Default)]
pub struct HKeyHasher {
    hash: u64,
}

impl Hasher for HKeyHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.hash = xxh3_64(bytes);
    }

    fn finish(&self) -> u64 {
        self.hash
    }
}

/// `BuildHasher` handing out [`HKeyHasher`]s for the `HKey`-keyed maps.
#[derive(Default, Clone)]
pub struct HKeyBuildHasher;

impl BuildHasher for HKeyBuildHasher {
    type Hasher = HKeyHasher;

    fn build_hasher(&self) -> Self::Hasher {
        HKeyHasher::default()
    }
}
