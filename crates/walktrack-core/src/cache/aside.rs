use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyValueCache;
use crate::store::StoreResult;

/// Envelope stored in the cache around every value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }
}

/// Cache-aside discipline over a [`KeyValueCache`] for one entity type.
///
/// Reads try the cache first and fall back to the loader, populating the
/// cache on a store hit. Writes always go to the store; an existing cache
/// entry is refreshed only after the store accepted the write. Cache
/// failures are logged and never returned.
pub struct CacheAside<V> {
    cache: Arc<dyn KeyValueCache>,
    namespace: &'static str,
    ttl: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for CacheAside<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            namespace: self.namespace,
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<V> CacheAside<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(cache: Arc<dyn KeyValueCache>, namespace: &'static str, ttl: Duration) -> Self {
        Self {
            cache,
            namespace,
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn cache_key(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }

    /// Look up `id`, loading from the store on a miss.
    ///
    /// A store miss is returned as `Ok(None)` and is not cached.
    pub async fn get<F, Fut>(&self, id: &str, loader: F) -> StoreResult<Option<V>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = StoreResult<Option<V>>> + Send,
    {
        let key = self.cache_key(id);
        if let Some(cached) = self.read(&key).await {
            debug!(key = %key, age_minutes = cached.age_minutes(), "Cache hit");
            return Ok(Some(cached.data));
        }

        let loaded = loader().await?;
        if let Some(ref value) = loaded {
            self.write(&key, value).await;
        }
        Ok(loaded)
    }

    /// Write `value` through to the store and refresh a live cache entry.
    ///
    /// The store write decides the outcome. If it fails, the cache keeps
    /// whatever it held before.
    pub async fn put<F, Fut>(&self, id: &str, value: &V, writer: F) -> StoreResult<()>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = StoreResult<()>> + Send,
    {
        let key = self.cache_key(id);
        let present = match self.cache.exists(&key).await {
            Ok(present) => present,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache existence check failed");
                false
            }
        };

        writer().await?;

        if present {
            self.write(&key, value).await;
        }
        Ok(())
    }

    /// Drop the entry for `id`, if any.
    pub async fn invalidate(&self, id: &str) {
        let key = self.cache_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate cache entry");
        }
    }

    async fn read(&self, key: &str) -> Option<CachedData<V>> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(cached) => Some(cached),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &V) {
        let encoded = match serde_json::to_string(&CachedData::new(value)) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, encoded, self.ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}
