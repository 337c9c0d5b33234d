use crate::cluster::member::Member;
use crate::dmap::{DmapError, DmapService, PutCondition};
use async_trait::async_trait;
use bitcode::{Decode, Encode};
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// A map-layer request addressed to a partition owner.
///
/// These are the only opcodes the lock protocol needs from the wire
/// layer: the two conditional-put forms and token-verified unlock. The
/// structs are plain `bitcode` values; framing and delivery belong to the
/// transport implementation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum DmapCommand {
    /// Conditional put with no expiry.
    PutIf {
        dmap: String,
        key: String,
        value: Vec<u8>,
        condition: PutCondition,
    },
    /// Conditional put with a relative TTL, applied at the owner.
    PutIfEx {
        dmap: String,
        key: String,
        value: Vec<u8>,
        ttl_ms: u64,
        condition: PutCondition,
    },
    /// Release the advisory lock at `key` if `token` matches.
    Unlock {
        dmap: String,
        key: String,
        token: Vec<u8>,
    },
}

/// Owner-side outcome of a [`DmapCommand`].
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum DmapReply {
    Ok,
    KeyFound,
    KeyNotFound,
    NoSuchLock,
    ServerGone,
    Err(String),
}

impl DmapReply {
    pub fn from_result(result: Result<(), DmapError>) -> DmapReply {
        match result {
            Ok(()) => DmapReply::Ok,
            Err(DmapError::KeyFound) => DmapReply::KeyFound,
            Err(DmapError::KeyNotFound) => DmapReply::KeyNotFound,
            Err(DmapError::NoSuchLock) => DmapReply::NoSuchLock,
            Err(DmapError::ServerGone) => DmapReply::ServerGone,
            Err(other) => DmapReply::Err(other.to_string()),
        }
    }

    pub fn into_result(self) -> Result<(), DmapError> {
        match self {
            DmapReply::Ok => Ok(()),
            DmapReply::KeyFound => Err(DmapError::KeyFound),
            DmapReply::KeyNotFound => Err(DmapError::KeyNotFound),
            DmapReply::NoSuchLock => Err(DmapError::NoSuchLock),
            DmapReply::ServerGone => Err(DmapError::ServerGone),
            DmapReply::Err(message) => Err(DmapError::Transport(message)),
        }
    }
}

/// Delivery of typed commands to a named member.
///
/// Implementations own connection management and framing; errors they
/// produce are opaque to the map layer and treated as fatal by the lock
/// retry loop.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn send(&self, member: &Member, command: DmapCommand) -> Result<DmapReply, DmapError>;
}

/// In-process transport connecting services by member name.
///
/// Backs embedded multi-fragment deployments and tests; peers are held
/// weakly so a dropped service simply becomes unreachable, mirroring a
/// member that left the cluster.
#[derive(Default)]
pub struct LoopbackTransport {
    peers: DashMap<String, Weak<DmapService>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, member: &Member, service: &Arc<DmapService>) {
        self.peers
            .insert(member.name().to_string(), Arc::downgrade(service));
    }
}

#[async_trait]
impl ClusterTransport for LoopbackTransport {
    async fn send(&self, member: &Member, command: DmapCommand) -> Result<DmapReply, DmapError> {
        let service = self
            .peers
            .get(member.name())
            .and_then(|peer| peer.upgrade())
            .ok_or_else(|| DmapError::Transport(format!("unknown member: {member}")))?;
        Ok(service.handle_command(command).await)
    }
}
