//! Cache Module
//!
//! The in-memory driver: bounded LRU eviction, TTL expiration and tag indexing.

use std::num::NonZeroUsize;

mod entry;
mod lru;
mod stats;
mod store;
mod tags;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::MemoryCacheStore;
pub use tags::TagIndex;

pub(crate) use store::StoreState;

// == Public Constants ==
/// Entry bound used when none is configured
pub const DEFAULT_MAX_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(size) => size,
    None => panic!("default max size must be non-zero"),
};
