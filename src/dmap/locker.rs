use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;

/// Attempt to release a key that is not currently locked.
#[derive(Debug, Error)]
#[error("no fine-grained lock held for key: {0}")]
pub struct NotLockedError(pub String);

struct LockCtx {
    /// Holders plus waiters. The context is dropped when this reaches
    /// zero, so the table only holds keys somebody cares about.
    claims: usize,
    sem: Arc<Semaphore>,
}

/// Process-wide mutex keyed by string.
///
/// `lock` blocks until no other holder of the same key remains; `unlock`
/// releases. The map layer uses it to serialize unlock's get-then-delete
/// against concurrent unlocks of the same `(dmap, key)`; it is invisible
/// outside the node and carries no cluster-wide meaning.
#[derive(Default)]
pub struct KeyLocker {
    locks: Mutex<HashMap<String, LockCtx>>,
}

impl KeyLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the key is exclusively held by the caller.
    pub async fn lock(&self, key: &str) {
        let sem = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let ctx = locks.entry(key.to_string()).or_insert_with(|| LockCtx {
                claims: 0,
                sem: Arc::new(Semaphore::new(1)),
            });
            ctx.claims += 1;
            Arc::clone(&ctx.sem)
        };
        // The semaphore is never closed, so acquisition only ever waits.
        if let Ok(permit) = sem.acquire_owned().await {
            permit.forget();
        }
    }

    /// Releases a key previously taken with [`KeyLocker::lock`].
    pub fn unlock(&self, key: &str) -> Result<(), NotLockedError> {
        let sem = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(ctx) = locks.get_mut(key) else {
                return Err(NotLockedError(key.to_string()));
            };
            ctx.claims -= 1;
            let sem = Arc::clone(&ctx.sem);
            if ctx.claims == 0 {
                locks.remove(key);
            }
            sem
        };
        sem.add_permits(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_mutually_exclusive() {
        let locker = Arc::new(KeyLocker::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locker = locker.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                locker.lock("shared").await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                locker.unlock("shared").unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locker = KeyLocker::new();
        locker.lock("a").await;
        locker.lock("b").await;
        locker.unlock("a").unwrap();
        locker.unlock("b").unwrap();
    }

    #[tokio::test]
    async fn unlock_without_lock_fails() {
        let locker = KeyLocker::new();
        assert!(locker.unlock("never-locked").is_err());

        locker.lock("once").await;
        locker.unlock("once").unwrap();
        assert!(locker.unlock("once").is_err());
    }
}
