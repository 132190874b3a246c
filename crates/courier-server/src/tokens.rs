//! Provider access-token cache.
//!
//! WeChat-style providers hand out short-lived access tokens that must be
//! shared across workers. Tokens live in redis keyed by channel UUID with
//! the provider-supplied expiry as TTL; a sharded in-process mutex makes
//! sure only one task fetches when the cache is empty. An in-memory store
//! backs development mode and tests.

use parking_lot::Mutex as SyncMutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use courier_core::SendError;

/// Default token lifetime when the provider does not supply one.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 7200;

const LOCK_SHARDS: usize = 16;

enum Store {
    Redis(ConnectionManager),
    Memory(SyncMutex<HashMap<String, (String, Instant)>>),
}

pub struct TokenCache {
    store: Store,
    locks: Vec<Mutex<()>>,
}

impl TokenCache {
    /// Redis-backed cache shared across gateway instances.
    pub async fn redis(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            store: Store::Redis(conn),
            locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Process-local cache for development and tests.
    pub fn memory() -> Self {
        Self {
            store: Store::Memory(SyncMutex::new(HashMap::new())),
            locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard(&self, channel_uuid: Uuid) -> &Mutex<()> {
        let idx = channel_uuid.as_bytes()[0] as usize % LOCK_SHARDS;
        &self.locks[idx]
    }

    fn key(channel_uuid: Uuid) -> String {
        format!("channel-token:{channel_uuid}")
    }

    /// Returns the cached token for the channel, fetching a fresh one with
    /// `fetch` when missing. `fetch` resolves to the token and its lifetime
    /// in seconds; only one task per channel fetches at a time.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        channel_uuid: Uuid,
        fetch: F,
    ) -> Result<String, SendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, u64), SendError>>,
    {
        let key = Self::key(channel_uuid);

        if let Some(token) = self.get(&key).await? {
            return Ok(token);
        }

        let _guard = self.shard(channel_uuid).lock().await;

        // another task may have fetched while we waited on the lock
        if let Some(token) = self.get(&key).await? {
            return Ok(token);
        }

        debug!(channel_uuid = %channel_uuid, "fetching fresh access token");
        let (token, ttl_seconds) = fetch().await?;
        let ttl_seconds = if ttl_seconds == 0 {
            DEFAULT_TOKEN_TTL_SECONDS
        } else {
            ttl_seconds
        };
        self.set(&key, &token, ttl_seconds).await?;
        Ok(token)
    }

    /// Drops the cached token, forcing a re-fetch on next use.
    pub async fn invalidate(&self, channel_uuid: Uuid) -> Result<(), SendError> {
        let key = Self::key(channel_uuid);
        match &self.store {
            Store::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn
                    .del(&key)
                    .await
                    .map_err(|e| SendError::Other(format!("token cache error: {e}")))?;
            }
            Store::Memory(map) => {
                map.lock().remove(&key);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SendError> {
        match &self.store {
            Store::Redis(conn) => {
                let mut conn = conn.clone();
                conn.get(key)
                    .await
                    .map_err(|e| SendError::Other(format!("token cache error: {e}")))
            }
            Store::Memory(map) => {
                let mut map = map.lock();
                match map.get(key) {
                    Some((token, expires)) if *expires > Instant::now() => {
                        Ok(Some(token.clone()))
                    }
                    Some(_) => {
                        map.remove(key);
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
        }
    }

    async fn set(&self, key: &str, token: &str, ttl_seconds: u64) -> Result<(), SendError> {
        match &self.store {
            Store::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn
                    .set_ex(key, token, ttl_seconds)
                    .await
                    .map_err(|e| SendError::Other(format!("token cache error: {e}")))?;
            }
            Store::Memory(map) => {
                map.lock().insert(
                    key.to_string(),
                    (
                        token.to_string(),
                        Instant::now() + Duration::from_secs(ttl_seconds),
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fetches_once_and_caches() {
        let cache = TokenCache::memory();
        let uuid = Uuid::new_v4();
        let fetches = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let fetches = fetches.clone();
            let token = cache
                .get_or_fetch(uuid, move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(("TOKEN123".to_string(), 7200))
                })
                .await
                .unwrap();
            assert_eq!(token, "TOKEN123");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = TokenCache::memory();
        let uuid = Uuid::new_v4();

        let token = cache
            .get_or_fetch(uuid, || async { Ok(("first".to_string(), 7200)) })
            .await
            .unwrap();
        assert_eq!(token, "first");

        cache.invalidate(uuid).await.unwrap();

        let token = cache
            .get_or_fetch(uuid, || async { Ok(("second".to_string(), 7200)) })
            .await
            .unwrap();
        assert_eq!(token, "second");
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let cache = TokenCache::memory();
        let err = cache
            .get_or_fetch(Uuid::new_v4(), || async {
                Err(SendError::ResponseStatus(401))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ResponseStatus(401)));
    }
}
