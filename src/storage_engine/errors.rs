use thiserror::Error;

/// Errors surfaced by tables and the table-chain engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Negative read result. Not a failure for higher layers, but `get`
    /// surfaces it as-is.
    #[error("key not found")]
    KeyNotFound,

    /// The table chain is fragmented. Returned by `export` while the chain
    /// is longer than a single table.
    #[error("storage fragmented, compaction required")]
    Fragmented,

    /// The newest table cannot hold the frame. Always recovered internally
    /// by allocating a new table; callers never observe it.
    #[error("not enough space in table")]
    NotEnoughSpace,

    /// Key exceeds the single-byte length prefix.
    #[error("key length {0} does not fit the single-byte length prefix")]
    KeyTooLarge(usize),

    #[error("invalid match pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("transport blob: {0}")]
    Codec(#[from] bincode::Error),

    /// An imported blob failed structural validation.
    #[error("malformed transport blob")]
    MalformedTransport,
}

/// Soft signal attached to successful writes. `Fragmented` means the
/// operation spilled into a new table (or crossed the garbage threshold)
/// and a compaction pass would reduce memory or unblock `export`. It is
/// never an error; the write succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum CompactionHint {
    None,
    Fragmented,
}

impl CompactionHint {
    pub fn is_fragmented(self) -> bool {
        matches!(self, CompactionHint::Fragmented)
    }

    /// Merge two hints, keeping the stronger signal.
    pub fn or(self, other: CompactionHint) -> CompactionHint {
        if self.is_fragmented() || other.is_fragmented() {
            CompactionHint::Fragmented
        } else {
            CompactionHint::None
        }
    }
}
