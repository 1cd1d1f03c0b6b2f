//! Store contracts
//!
//! Drivers implement [`CacheStore`] (and [`TaggableCacheStore`] when they can index
//! entries by tag). Every operation is async so a networked driver can be swapped in
//! for the in-memory one without touching callers.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::ttl::Ttl;

/// Minimal key-value store with TTL.
///
/// All methods must be safe to call concurrently. `increment`/`decrement` must be
/// atomic with respect to each other and to `get`/`put` on the same key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// `None` stores the value without expiry.
    async fn put(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()>;

    /// Stores every entry with the same TTL.
    async fn put_many(&self, entries: Vec<(String, Value)>, ttl: Option<Ttl>) -> Result<()> {
        for (key, value) in entries {
            self.put(&key, value, ttl.clone()).await?;
        }
        Ok(())
    }

    /// Looks up several keys at once. Missing keys map to `None`.
    async fn many(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if !found.contains_key(key) {
                found.insert(key.clone(), self.get(key).await?);
            }
        }
        Ok(found)
    }

    /// Removes `key`. Returns whether an entry was removed.
    async fn forget(&self, key: &str) -> Result<bool>;

    /// Returns whether a live entry exists for `key`.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Adds `by` to the integer under `key` (missing counts as 0) and returns the result.
    async fn increment(&self, key: &str, by: i64) -> Result<i64>;

    /// Subtracts `by` from the integer under `key` (missing counts as 0).
    async fn decrement(&self, key: &str, by: i64) -> Result<i64>;

    /// Stores `value` only when `key` is absent or expired. Returns whether it wrote.
    ///
    /// The default is a non-atomic `has` + `put`; drivers that can do better override it.
    async fn add(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<bool> {
        if self.has(key).await? {
            return Ok(false);
        }
        self.put(key, value, ttl).await?;
        Ok(true)
    }

    /// Removes `key` only when its live value equals `expected`.
    ///
    /// The default is a non-atomic `get` + compare + `forget`.
    async fn forget_if(&self, key: &str, expected: &Value) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if &current == expected => self.forget(key).await,
            _ => Ok(false),
        }
    }

    /// Returns the live value for `key` and removes it.
    ///
    /// The default is a non-atomic `get` + `forget`.
    async fn pull(&self, key: &str) -> Result<Option<Value>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.forget(key).await?;
        }
        Ok(value)
    }

    /// Removes every entry.
    async fn flush(&self) -> Result<()>;

    /// Releases driver resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// A [`CacheStore`] that can label entries and invalidate them by label.
#[async_trait]
pub trait TaggableCacheStore: CacheStore {
    /// Stores `value` under `key` carrying `tags`. Replaces the key's previous tags.
    async fn put_with_tags(
        &self,
        key: &str,
        value: Value,
        tags: &[String],
        ttl: Option<Ttl>,
    ) -> Result<()>;

    /// Removes every entry carrying any of `tags`.
    async fn flush_tags(&self, tags: &[String]) -> Result<()>;
}
