//! Memory Cache Store Module
//!
//! In-process driver combining HashMap storage with LRU tracking, TTL expiration
//! and a tag index.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStats, LruTracker, TagIndex, DEFAULT_MAX_SIZE};
use crate::contracts::{CacheStore, TaggableCacheStore};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_cleanup_task;
use crate::ttl::{Expiration, Ttl};

// == Store State ==
/// Entries, recency order and tag index guarded by one lock.
///
/// Entries, `lru` and `tags` are only mutated through [`StoreState::insert_entry`]
/// and [`StoreState::remove_entry`], which keep them in step.
#[derive(Debug)]
pub(crate) struct StoreState {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    tags: TagIndex,
    stats: CacheStats,
    max_size: usize,
}

impl StoreState {
    pub(crate) fn new(max_size: NonZeroUsize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            tags: TagIndex::new(),
            stats: CacheStats::new(),
            max_size: max_size.get(),
        }
    }

    // == Insert Entry ==
    /// Inserts or overwrites `key` as most recently used, then enforces the size bound.
    fn insert_entry(&mut self, key: &str, entry: CacheEntry) {
        if let Some(previous) = self.entries.remove(key) {
            self.tags.detach(key, &previous.tags);
        }

        self.tags.attach(key, &entry.tags);
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);

        if self.entries.len() > self.max_size {
            if let Some(victim) = self.lru.peek_oldest().map(str::to_string) {
                self.remove_entry(&victim);
                self.stats.record_eviction();
                debug!(
                    key = %victim,
                    max_size = self.max_size,
                    "Evicted least recently used entry"
                );
            }
        }
    }

    // == Remove Entry ==
    /// Removes `key` from the entries, the recency order and every tag it carries.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.tags.detach(key, &entry.tags);
        Some(entry)
    }

    /// Returns the entry for `key` if it is live, dropping it if expired.
    ///
    /// Does not change recency.
    fn live(&mut self, key: &str) -> Option<&CacheEntry> {
        let expired = self.entries.get(key)?.is_expired();
        if expired {
            self.remove_entry(key);
            self.stats.record_expiration();
            debug!(key, "Lazily expired entry");
            return None;
        }
        self.entries.get(key)
    }

    /// Reads `key`, promoting it to most recently used on a hit.
    fn read(&mut self, key: &str) -> Option<Value> {
        let value = self.live(key).map(|entry| entry.value.clone());
        match value {
            Some(value) => {
                self.lru.touch(key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Writes `value` under `key`; an already elapsed lifetime removes the key instead.
    fn write(&mut self, key: &str, value: Value, tags: BTreeSet<String>, expiration: Expiration) {
        match expiration {
            Expiration::Immediate => {
                self.remove_entry(key);
            }
            Expiration::Never | Expiration::At(_) => {
                let entry = CacheEntry::new(value, expiration.expires_at(), tags);
                self.insert_entry(key, entry);
            }
        }
    }

    /// Applies `op` to the integer under `key` (missing counts as 0) and stores the
    /// result untagged and without expiry.
    fn apply_delta(&mut self, key: &str, op: impl FnOnce(i64) -> Option<i64>) -> Result<i64> {
        let current = match self.live(key) {
            Some(entry) => entry
                .value
                .as_i64()
                .ok_or_else(|| CacheError::NonNumericValue(key.to_string()))?,
            None => 0,
        };

        let next = op(current).ok_or_else(|| CacheError::NumericOverflow(key.to_string()))?;
        self.write(key, Value::from(next), BTreeSet::new(), Expiration::Never);
        Ok(next)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were removed.
    pub(crate) fn purge_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        expired_keys.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.tags.clear();
    }
}

// == Memory Cache Store ==
/// Bounded, LRU-evicting, TTL-aware, tag-indexed in-process store.
///
/// Each instance owns its state; share it between managers through an `Arc`.
#[derive(Debug)]
pub struct MemoryCacheStore {
    state: Arc<Mutex<StoreState>>,
    cleanup: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCacheStore {
    // == Constructor ==
    /// Creates a store holding at most `max_size` entries.
    pub fn new(max_size: NonZeroUsize) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new(max_size))),
            cleanup: std::sync::Mutex::new(None),
        }
    }

    // == Background Cleanup ==
    /// Starts a background task that purges expired entries every `interval`.
    ///
    /// Replaces any cleanup task already running. Must be called from within a
    /// tokio runtime.
    pub fn spawn_cleanup(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cleanup interval must be positive".to_string(),
            ));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CacheError::InvalidConfig(
                "cleanup task requires a running tokio runtime".to_string(),
            ));
        }

        let handle = spawn_cleanup_task(Arc::downgrade(&self.state), interval);
        let mut slot = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Returns true while a background cleanup task is running.
    pub fn has_cleanup_task(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn stop_cleanup(&self) -> bool {
        let handle = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Removes every expired entry now. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.state.lock().await.purge_expired()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.total_entries = state.entries.len();
        stats
    }

    /// Returns the number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Returns true when no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Entry bound this store evicts at.
    pub async fn max_size(&self) -> usize {
        self.state.lock().await.max_size
    }

    /// Tags recorded on the entry for `key`, empty if absent.
    pub async fn tags_for(&self, key: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .map(|entry| entry.tags.clone())
            .unwrap_or_default()
    }

    /// Keys the tag index currently lists under `tag`.
    pub async fn keys_for_tag(&self, tag: &str) -> BTreeSet<String> {
        self.state.lock().await.tags.keys(tag)
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl Drop for MemoryCacheStore {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().await.read(key))
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()> {
        let expiration = Expiration::from_ttl(ttl.as_ref())?;
        self.state
            .lock()
            .await
            .write(key, value, BTreeSet::new(), expiration);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, Value)>, ttl: Option<Ttl>) -> Result<()> {
        let expiration = Expiration::from_ttl(ttl.as_ref())?;
        let mut state = self.state.lock().await;
        for (key, value) in entries {
            state.write(&key, value, BTreeSet::new(), expiration);
        }
        Ok(())
    }

    async fn many(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>> {
        let mut state = self.state.lock().await;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if !found.contains_key(key) {
                found.insert(key.clone(), state.read(key));
            }
        }
        Ok(found)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        Ok(self.state.lock().await.remove_entry(key).is_some())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.state.lock().await.live(key).is_some())
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.state
            .lock()
            .await
            .apply_delta(key, |current| current.checked_add(by))
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.state
            .lock()
            .await
            .apply_delta(key, |current| current.checked_sub(by))
    }

    async fn add(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<bool> {
        let expiration = Expiration::from_ttl(ttl.as_ref())?;
        let mut state = self.state.lock().await;
        if state.live(key).is_some() || expiration == Expiration::Immediate {
            return Ok(false);
        }
        state.write(key, value, BTreeSet::new(), expiration);
        Ok(true)
    }

    async fn forget_if(&self, key: &str, expected: &Value) -> Result<bool> {
        let mut state = self.state.lock().await;
        let matches = state
            .live(key)
            .is_some_and(|entry| &entry.value == expected);
        if matches {
            state.remove_entry(key);
        }
        Ok(matches)
    }

    async fn pull(&self, key: &str) -> Result<Option<Value>> {
        let mut state = self.state.lock().await;
        let value = state.read(key);
        if value.is_some() {
            state.remove_entry(key);
        }
        Ok(value)
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let removed = state.entries.len();
        state.clear();
        info!(removed, "Flushed memory cache store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.stop_cleanup() {
            debug!("Stopped memory store cleanup task");
        }
        Ok(())
    }
}

#[async_trait]
impl TaggableCacheStore for MemoryCacheStore {
    async fn put_with_tags(
        &self,
        key: &str,
        value: Value,
        tags: &[String],
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let expiration = Expiration::from_ttl(ttl.as_ref())?;
        let tags: BTreeSet<String> = tags.iter().cloned().collect();
        self.state.lock().await.write(key, value, tags, expiration);
        Ok(())
    }

    async fn flush_tags(&self, tags: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for tag in tags {
            let keys = state.tags.take(tag);
            let removed = keys.len();
            for key in keys {
                state.remove_entry(&key);
            }
            debug!(tag = %tag, removed, "Flushed tag");
        }
        Ok(())
    }
}
