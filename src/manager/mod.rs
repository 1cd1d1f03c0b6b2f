//! Cache manager
//!
//! The facade callers talk to. Delegates data operations to a
//! [`TaggableCacheStore`] and exclusion to a [`LockManager`] over the same store.

mod tagged;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cache::MemoryCacheStore;
use crate::config::{CacheConfig, CacheDriver};
use crate::contracts::{CacheStore, TaggableCacheStore};
use crate::error::{CacheError, Result};
use crate::lock::{Lock, LockManager, LockOptions};
use crate::ttl::{Expiration, Ttl};

pub use tagged::TaggedCache;

/// Lock handle returned by [`CacheManager::lock`].
pub type ManagedLock = Lock<dyn TaggableCacheStore>;

// == Cache Manager ==
/// Ergonomic cache facade: typed get/put, remember, tags and locks.
///
/// Cloning is cheap and clones share the store. Managers built over the same store
/// instance see each other's entries; give them distinct prefixes to keep them apart.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn TaggableCacheStore>,
    locks: LockManager<dyn TaggableCacheStore>,
    prefix: String,
}

impl CacheManager {
    /// Creates a manager over `store`, prefixing every key and tag with `prefix`.
    pub fn new(store: Arc<dyn TaggableCacheStore>, prefix: impl Into<String>) -> Self {
        Self {
            locks: LockManager::new(Arc::clone(&store)),
            store,
            prefix: prefix.into(),
        }
    }

    /// Manager over a fresh memory store with default settings and no prefix.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::default()), "")
    }

    /// Builds the configured driver and a manager over it.
    ///
    /// Starting the background sweep (`cleanup_interval`) requires a tokio runtime.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn TaggableCacheStore> = match config.driver {
            CacheDriver::Memory => {
                let store = MemoryCacheStore::new(config.max_size_non_zero()?);
                if let Some(secs) = config.cleanup_interval {
                    store.spawn_cleanup(Duration::from_secs(secs))?;
                }
                Arc::new(store)
            }
        };

        info!(
            driver = config.driver.as_str(),
            prefix = %config.prefix,
            max_size = config.max_size,
            cleanup_interval = ?config.cleanup_interval,
            "Cache manager initialized"
        );

        Ok(Self::new(store, config.prefix.clone()))
    }

    // == Accessors ==
    /// Underlying driver, shared with every clone of this manager.
    pub fn store(&self) -> &Arc<dyn TaggableCacheStore> {
        &self.store
    }

    /// Prefix prepended to every key and tag.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn tag_names(&self, tags: &[String]) -> Vec<String> {
        tags.iter().map(|tag| self.key(tag)).collect()
    }

    // == Reads ==

    /// Returns the cached value for `key`, or `None` when absent or expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        decode(self.store.get(&self.key(key)).await?)
    }

    /// Looks up several keys. Keys in the result are the ones passed in, unprefixed.
    pub async fn many<T: DeserializeOwned>(
        &self,
        keys: &[&str],
    ) -> Result<HashMap<String, Option<T>>> {
        let physical: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        let found = self.store.many(&physical).await?;

        let mut values = HashMap::with_capacity(keys.len());
        for (key, physical_key) in keys.iter().zip(&physical) {
            let value = decode(found.get(physical_key).cloned().flatten())?;
            values.insert(key.to_string(), value);
        }
        Ok(values)
    }

    /// Returns whether a live entry exists for `key`. Does not affect recency.
    pub async fn has(&self, key: &str) -> Result<bool> {
        self.store.has(&self.key(key)).await
    }

    // == Writes ==

    /// Stores `value` under `key` for `ttl`.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl Into<Ttl>,
    ) -> Result<()> {
        self.store
            .put(&self.key(key), serde_json::to_value(value)?, Some(ttl.into()))
            .await
    }

    /// Stores `value` under `key` without expiry.
    pub async fn forever<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.store
            .put(&self.key(key), serde_json::to_value(value)?, None)
            .await
    }

    /// Stores every entry with the same TTL; `None` never expires.
    pub async fn put_many<T: Serialize>(
        &self,
        entries: &[(&str, T)],
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let entries = entries
            .iter()
            .map(|(key, value)| -> Result<(String, Value)> {
                Ok((self.key(key), serde_json::to_value(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.store.put_many(entries, ttl).await
    }

    /// Stores `value` only if `key` is absent. Returns whether it wrote.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl Into<Ttl>,
    ) -> Result<bool> {
        self.store
            .add(&self.key(key), serde_json::to_value(value)?, Some(ttl.into()))
            .await
    }

    // == Counters ==
    /// Adds `by` to the integer under `key`, starting from 0 when missing.
    ///
    /// The result is stored without expiry. Fails on non-integer values and on
    /// overflow.
    pub async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.store.increment(&self.key(key), by).await
    }

    /// Subtracts `by` from the integer under `key`; see [`CacheManager::increment`].
    pub async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.store.decrement(&self.key(key), by).await
    }

    /// Removes `key`. Returns whether an entry was removed.
    pub async fn forget(&self, key: &str) -> Result<bool> {
        self.store.forget(&self.key(key)).await
    }

    /// Returns the value for `key` and removes it.
    pub async fn pull<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        decode(self.store.pull(&self.key(key)).await?)
    }

    /// Clears the whole store, including entries written under other prefixes.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    // == Remember ==

    /// Returns the cached value for `key`, or computes it with `factory` and caches
    /// it for `ttl`.
    ///
    /// Concurrent callers missing the same key may each run `factory`; wrap the
    /// call in [`CacheManager::lock_and_run`] when it must run once. A failing
    /// factory leaves the key unset.
    pub async fn remember<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: impl Into<Ttl>,
        factory: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        self.remember_tagged(key, &[], Some(ttl.into()), factory).await
    }

    /// [`CacheManager::remember`] without expiry.
    pub async fn remember_forever<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        self.remember_tagged(key, &[], None, factory).await
    }

    // == Tags ==

    /// Returns a view whose writes carry `tags` and whose `flush` only removes
    /// entries with those tags.
    pub fn tags<I, S>(&self, tags: I) -> TaggedCache
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaggedCache::new(self.clone(), tags.into_iter().map(Into::into).collect())
    }

    pub(crate) async fn put_tagged(
        &self,
        key: &str,
        value: Value,
        tags: &[String],
        ttl: Option<Ttl>,
    ) -> Result<()> {
        self.store
            .put_with_tags(&self.key(key), value, &self.tag_names(tags), ttl)
            .await
    }

    pub(crate) async fn flush_tags(&self, tags: &[String]) -> Result<()> {
        self.store.flush_tags(&self.tag_names(tags)).await
    }

    pub(crate) async fn remember_tagged<T, E, F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<Ttl>,
        factory: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        // Reject a malformed TTL before doing any work
        Expiration::from_ttl(ttl.as_ref())?;

        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let value = factory().await?;
        let encoded = serde_json::to_value(&value).map_err(CacheError::from)?;
        self.put_tagged(key, encoded, tags, ttl).await?;
        Ok(value)
    }

    // == Locks ==

    /// Tries to take the lock `key` for `timeout` with the default retry policy.
    pub async fn lock(&self, key: &str, timeout: impl Into<Ttl>) -> Result<ManagedLock> {
        self.lock_with(key, &LockOptions::new(timeout)).await
    }

    /// Tries to take the lock `key` with explicit options.
    pub async fn lock_with(&self, key: &str, options: &LockOptions) -> Result<ManagedLock> {
        self.locks.acquire(&self.key(key), options).await
    }

    /// Runs `f` while holding the lock `key`; see [`LockManager::lock_and_run`].
    pub async fn lock_and_run<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: impl Into<Ttl>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        self.locks.lock_and_run(&self.key(key), ttl, f).await
    }

    /// Closes the underlying store.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(CacheError::from)
}
