use crate::cluster::{ClusterTransport, DmapCommand, DmapReply, PartitionRouter};
use crate::dmap::locker::KeyLocker;
use crate::dmap::map::DMap;
use crate::dmap::{PutCondition, PutEnv};
use crate::storage_engine::StoreConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Node-level collaborators shared by every map: the partition router,
/// the RPC transport, the fine-grained locker and the shutdown signal.
pub(crate) struct NodeContext {
    pub(crate) router: Arc<dyn PartitionRouter>,
    pub(crate) transport: Arc<dyn ClusterTransport>,
    pub(crate) locker: KeyLocker,
    pub(crate) shutdown: CancellationToken,
}

/// Registry of named maps on one node.
///
/// The service owns the node context and hands out shared [`DMap`]
/// handles; it is also the owner-side dispatch point for commands
/// arriving from remote members.
pub struct DmapService {
    ctx: Arc<NodeContext>,
    config: StoreConfig,
    dmaps: DashMap<String, Arc<DMap>>,
}

impl DmapService {
    pub fn new(
        router: Arc<dyn PartitionRouter>,
        transport: Arc<dyn ClusterTransport>,
    ) -> Self {
        Self::with_config(router, transport, StoreConfig::default())
    }

    pub fn with_config(
        router: Arc<dyn PartitionRouter>,
        transport: Arc<dyn ClusterTransport>,
        config: StoreConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(NodeContext {
                router,
                transport,
                locker: KeyLocker::new(),
                shutdown: CancellationToken::new(),
            }),
            config,
            dmaps: DashMap::new(),
        }
    }

    /// Looks up a map by name, creating it on first use.
    pub fn get_or_create_dmap(&self, name: &str) -> Arc<DMap> {
        self.dmaps
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new_cyclic(|handle| {
                    DMap::new(name, Arc::clone(&self.ctx), self.config.clone(), handle.clone())
                })
            })
            .clone()
    }

    /// Owner-side dispatch for commands received over the wire.
    pub async fn handle_command(&self, command: DmapCommand) -> DmapReply {
        if self.ctx.shutdown.is_cancelled() {
            return DmapReply::ServerGone;
        }
        let result = match command {
            DmapCommand::PutIf {
                dmap,
                key,
                value,
                condition,
            } => self.apply_put(&dmap, &key, value, None, condition),
            DmapCommand::PutIfEx {
                dmap,
                key,
                value,
                ttl_ms,
                condition,
            } => self.apply_put(
                &dmap,
                &key,
                value,
                Some(Duration::from_millis(ttl_ms)),
                condition,
            ),
            DmapCommand::Unlock { dmap, key, token } => {
                self.get_or_create_dmap(&dmap).unlock_key(&key, &token).await
            }
        };
        DmapReply::from_result(result)
    }

    /// Signals every in-flight operation that the node is going away.
    /// Blocked lock acquires observe it on their next wait.
    pub fn shutdown(&self) {
        info!("dmap service shutting down");
        self.ctx.shutdown.cancel();
    }

    fn apply_put(
        &self,
        dmap: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: PutCondition,
    ) -> Result<(), crate::dmap::DmapError> {
        let env = PutEnv::new(dmap, key, value)
            .with_ttl(ttl)
            .with_condition(condition);
        self.get_or_create_dmap(dmap).put(env)
    }
}
