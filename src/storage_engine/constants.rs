use std::time::Duration;

// Entry frame header (fixed 21 bytes at the start of each frame)
pub const ENTRY_HEADER_SIZE: usize = 21;
pub const KEY_LEN_RANGE: std::ops::Range<usize> = 0..1;
pub const TTL_RANGE: std::ops::Range<usize> = 1..9;
pub const TIMESTAMP_RANGE: std::ops::Range<usize> = 9..17;
pub const VAL_LEN_RANGE: std::ops::Range<usize> = 17..21;

/// Keys are length-prefixed with a single byte.
pub const MAX_KEY_LEN: usize = 255;

/// TTL sentinel meaning "no automatic expiry".
pub const NO_EXPIRY: u64 = 0;

// Table sizing. The default capacity is a power of two; growth is driven
// by the engine's total in-use bytes, with this as the floor.
pub const MIN_TABLE_SIZE: usize = 1 << 16;

/// A single-table chain whose garbage crosses this ratio gets a fresh
/// table appended on delete so a compaction pass can drain it.
pub const MAX_GARBAGE_RATIO: f64 = 0.40;

/// Advisory lock tokens are this many cryptographically random bytes.
pub const LOCK_TOKEN_LEN: usize = 16;

/// Contended lock acquires re-attempt the conditional put at this period.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
