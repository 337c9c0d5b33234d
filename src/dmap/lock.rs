use crate::cluster::{hkey, DmapCommand};
use crate::dmap::env::{PutCondition, PutEnv};
use crate::dmap::errors::DmapError;
use crate::dmap::map::DMap;
use crate::storage_engine::constants::{LOCK_RETRY_INTERVAL, LOCK_TOKEN_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Handle returned by a successful lock acquire. It carries the token
/// proving ownership and a shared handle to the map; releasing the lock
/// means presenting the token back through [`LockContext::unlock`].
pub struct LockContext {
    key: String,
    token: Vec<u8>,
    dmap: Arc<DMap>,
}

impl std::fmt::Debug for LockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockContext")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

impl LockContext {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Releases the lock. Returns `NoSuchLock` when the key no longer
    /// holds this token: the lock expired, was already released, or was
    /// taken over by another acquirer after TTL expiry.
    pub async fn unlock(&self) -> Result<(), DmapError> {
        self.dmap.unlock(&self.key, &self.token).await
    }
}

impl DMap {
    /// Acquires an advisory lock on `key`, waiting up to `deadline` for a
    /// current holder to release. The lock auto-releases once `ttl`
    /// elapses, whether or not the holder is still alive.
    ///
    /// Locks are approximate under membership changes; use them for
    /// coordination, not invariants that must survive partition loss.
    pub async fn lock_with_timeout(
        &self,
        key: &str,
        ttl: Duration,
        deadline: Duration,
    ) -> Result<LockContext, DmapError> {
        self.lock_key(key, Some(ttl), deadline).await
    }

    /// [`DMap::lock_with_timeout`] without automatic expiry. If the caller
    /// dies without unlocking, the key stays locked until the partition
    /// itself is gone.
    pub async fn lock(&self, key: &str, deadline: Duration) -> Result<LockContext, DmapError> {
        self.lock_key(key, None, deadline).await
    }

    async fn lock_key(
        &self,
        key: &str,
        ttl: Option<Duration>,
        deadline: Duration,
    ) -> Result<LockContext, DmapError> {
        let dmap = self.shared_handle().ok_or(DmapError::ServerGone)?;

        let mut token = vec![0u8; LOCK_TOKEN_LEN];
        OsRng
            .try_fill_bytes(&mut token)
            .map_err(|err| DmapError::TokenGeneration(err.to_string()))?;

        let env = PutEnv::new(self.name(), key, token.clone())
            .with_ttl(ttl)
            .with_condition(PutCondition::IfNotFound);
        self.try_lock(env, deadline).await?;

        Ok(LockContext {
            key: key.to_string(),
            token,
            dmap,
        })
    }

    /// Attempts the conditional put once, then retries at 100 Hz under the
    /// deadline while the key stays held. `KeyFound` is the only
    /// retryable failure; everything else propagates unchanged.
    async fn try_lock(&self, env: PutEnv, deadline: Duration) -> Result<(), DmapError> {
        match self.put_on_owner(&env).await {
            Ok(()) => return Ok(()),
            Err(DmapError::KeyFound) => {}
            Err(err) => return Err(err),
        }

        let deadline_sleep = sleep(deadline);
        tokio::pin!(deadline_sleep);

        loop {
            tokio::select! {
                _ = sleep(LOCK_RETRY_INTERVAL) => {
                    match self.put_on_owner(&env).await {
                        Ok(()) => return Ok(()),
                        Err(DmapError::KeyFound) => continue,
                        Err(err) => return Err(err),
                    }
                }
                _ = &mut deadline_sleep => {
                    return Err(DmapError::LockNotAcquired);
                }
                _ = self.ctx().shutdown.cancelled() => {
                    return Err(DmapError::ServerGone);
                }
            }
        }
    }

    /// Runs the conditional put at the partition owner: directly when the
    /// owner is local, over the transport otherwise. Ownership is
    /// resolved fresh on every attempt, so a rebalance mid-retry simply
    /// redirects the next attempt.
    async fn put_on_owner(&self, env: &PutEnv) -> Result<(), DmapError> {
        let owner = self.ctx().router.owner(env.hkey);
        if owner == self.ctx().router.this() {
            return self.put(env.clone());
        }

        let command = match env.ttl {
            Some(ttl) => DmapCommand::PutIfEx {
                dmap: env.dmap.clone(),
                key: env.key.clone(),
                value: env.value.clone(),
                ttl_ms: ttl.as_millis() as u64,
                condition: env.condition,
            },
            None => DmapCommand::PutIf {
                dmap: env.dmap.clone(),
                key: env.key.clone(),
                value: env.value.clone(),
                condition: env.condition,
            },
        };
        self.ctx()
            .transport
            .send(&owner, command)
            .await?
            .into_result()
    }

    /// Routes an unlock to the partition owner.
    async fn unlock(&self, key: &str, token: &[u8]) -> Result<(), DmapError> {
        let hkey = hkey(self.name(), key);
        let owner = self.ctx().router.owner(hkey);
        if owner == self.ctx().router.this() {
            return self.unlock_key(key, token).await;
        }

        let command = DmapCommand::Unlock {
            dmap: self.name().to_string(),
            key: key.to_string(),
            token: token.to_vec(),
        };
        self.ctx()
            .transport
            .send(&owner, command)
            .await?
            .into_result()
    }

    /// Owner-side unlock: verify the stored value still equals `token`,
    /// then delete the key.
    ///
    /// The get and the delete are not atomic in the engine, so the whole
    /// check runs under the fine-grained locker; otherwise two concurrent
    /// unlocks from the same owner could both pass the token check before
    /// either deletes.
    pub(crate) async fn unlock_key(&self, key: &str, token: &[u8]) -> Result<(), DmapError> {
        let lock_key = format!("{}{}", self.name(), key);
        self.ctx().locker.lock(&lock_key).await;

        let result = self.unlock_key_locked(key, token);

        if let Err(err) = self.ctx().locker.unlock(&lock_key) {
            warn!(
                dmap = %self.name(),
                key,
                error = %err,
                "failed to release the fine-grained lock"
            );
        }
        result
    }

    fn unlock_key_locked(&self, key: &str, token: &[u8]) -> Result<(), DmapError> {
        let found = match self.get(key) {
            Ok(found) => found,
            Err(DmapError::KeyNotFound) => return Err(DmapError::NoSuchLock),
            Err(err) => return Err(err),
        };

        // Released by expiry and re-acquired, or never ours.
        if found.value() != token {
            return Err(DmapError::NoSuchLock);
        }

        self.delete_key(key)
            .map_err(|err| DmapError::UnlockDelete(Box::new(err)))
    }
}
