use crate::storage_engine::StorageError;
use thiserror::Error;

/// Errors surfaced by the map and lock layers.
#[derive(Debug, Error)]
pub enum DmapError {
    /// Negative read result, or an `IfFound` put against an absent or
    /// expired key.
    #[error("key not found")]
    KeyNotFound,

    /// An `IfNotFound` put hit a live entry. Consumed internally by the
    /// lock retry loop; callers of acquire see `LockNotAcquired` instead.
    #[error("key found")]
    KeyFound,

    /// The acquire deadline elapsed while the lock stayed held.
    #[error("lock not acquired")]
    LockNotAcquired,

    /// Unlock presented no matching key-token pair: the lock expired, was
    /// already released, or was taken over after TTL expiry.
    #[error("no such lock")]
    NoSuchLock,

    /// The owning node is shutting down mid-operation.
    #[error("server is gone")]
    ServerGone,

    /// The delete step of an unlock failed; tagged so the failure site is
    /// distinguishable from the token check.
    #[error("unlock failed because of delete: {0}")]
    UnlockDelete(#[source] Box<DmapError>),

    /// A writer panicked while holding a partition write latch.
    #[error("partition write latch poisoned")]
    LatchPoisoned,

    #[error("failed to generate lock token: {0}")]
    TokenGeneration(String),

    /// Opaque transport failure, propagated verbatim. Fatal for the lock
    /// retry loop.
    #[error("transport: {0}")]
    Transport(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for DmapError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyNotFound => DmapError::KeyNotFound,
            other => DmapError::Storage(other),
        }
    }
}
