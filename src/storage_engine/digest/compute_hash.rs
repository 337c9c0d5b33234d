use xxhash_rust::xxh3::xxh3_64;

/// Computes a 64-bit hash for the given bytes using XXH3.
///
/// XXH3 is a high-performance, non-cryptographic hash function that uses
/// SIMD and hardware acceleration when available. Hashed keys (`HKey`s)
/// derived from it are the only key form the storage layer ever sees:
/// tables index frames by `HKey`, and the partition router maps an `HKey`
/// to its owning member.
///
/// # Parameters
/// - `bytes`: The byte slice to hash.
///
/// # Returns
/// - A `u64` hash value derived from the input.
#[inline]
pub fn compute_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}
