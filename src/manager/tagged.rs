//! Tag-scoped view over a [`CacheManager`].

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::manager::CacheManager;
use crate::ttl::Ttl;

/// Writes through this view carry its tags; `flush` removes only entries with
/// any of them.
#[derive(Clone)]
pub struct TaggedCache {
    manager: CacheManager,
    tags: Vec<String>,
}

impl TaggedCache {
    pub(crate) fn new(manager: CacheManager, tags: Vec<String>) -> Self {
        Self { manager, tags }
    }

    // == Accessors ==
    /// Tag names as given, without the manager's prefix.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    // == Reads ==
    /// Reads `key` through the manager; tags do not scope reads.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.manager.get(key).await
    }

    /// Returns whether a live entry exists for `key`.
    pub async fn has(&self, key: &str) -> Result<bool> {
        self.manager.has(key).await
    }

    // == Writes ==
    /// Stores `value` under `key` for `ttl`, carrying this view's tags.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: impl Into<Ttl>,
    ) -> Result<()> {
        self.manager
            .put_tagged(key, serde_json::to_value(value)?, &self.tags, Some(ttl.into()))
            .await
    }

    /// Stores `value` under `key` without expiry, carrying this view's tags.
    pub async fn forever<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.manager
            .put_tagged(key, serde_json::to_value(value)?, &self.tags, None)
            .await
    }

    // == Remember ==
    /// [`CacheManager::remember`] whose write carries this view's tags.
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
        self.manager
            .remember_tagged(key, &self.tags, Some(ttl.into()), factory)
            .await
    }

    /// [`CacheManager::remember_forever`] whose write carries this view's tags.
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
        self.manager
            .remember_tagged(key, &self.tags, None, factory)
            .await
    }

    // == Flush ==
    /// Removes every entry carrying any of this view's tags.
    pub async fn flush(&self) -> Result<()> {
        self.manager.flush_tags(&self.tags).await
    }
}
