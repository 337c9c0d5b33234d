use crate::cluster::hkey;
use crate::storage_engine::constants::NO_EXPIRY;
use crate::utils::unix_nanos;
use bitcode::{Decode, Encode};
use std::time::Duration;

/// Write precondition evaluated against the live state of a key. Expired
/// entries count as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PutCondition {
    Always,
    IfNotFound,
    IfFound,
}

/// Everything a conditional put needs, bundled so local and remote paths
/// apply identical semantics. The timestamp is fixed when the envelope is
/// built; the TTL stays relative until the owner applies the write.
#[derive(Debug, Clone)]
pub struct PutEnv {
    pub dmap: String,
    pub key: String,
    pub hkey: u64,
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub ttl: Option<Duration>,
    pub condition: PutCondition,
}

impl PutEnv {
    pub fn new(dmap: &str, key: &str, value: Vec<u8>) -> Self {
        Self {
            dmap: dmap.to_string(),
            key: key.to_string(),
            hkey: hkey(dmap, key),
            value,
            timestamp: unix_nanos(),
            ttl: None,
            condition: PutCondition::Always,
        }
    }

    /// `None` is the no-expiry sentinel.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_condition(mut self, condition: PutCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Absolute expiry deadline for an apply happening at `now`.
    pub(crate) fn absolute_ttl(&self, now: u64) -> u64 {
        match self.ttl {
            Some(ttl) => now.saturating_add(ttl.as_nanos() as u64),
            None => NO_EXPIRY,
        }
    }
}
