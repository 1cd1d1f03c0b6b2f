//! Mini Cache - A driver-agnostic caching layer
//!
//! Provides TTL expressions, a bounded in-memory store with LRU eviction and tag
//! invalidation, distributed-style locks, and a [`CacheManager`] facade with
//! `remember`, `pull`, `add` and tagged views.

pub mod cache;
pub mod config;
pub mod contracts;
pub mod error;
pub mod lock;
pub mod manager;
mod tasks;
pub mod ttl;

pub use cache::{CacheStats, MemoryCacheStore};
pub use config::{CacheConfig, CacheDriver};
pub use contracts::{CacheStore, TaggableCacheStore};
pub use error::{CacheError, Result};
pub use lock::{Lock, LockManager, LockOptions};
pub use manager::{CacheManager, ManagedLock, TaggedCache};
pub use ttl::{calculate_expiration, is_expired, parse_ttl, parse_ttl_ms, Ttl};
