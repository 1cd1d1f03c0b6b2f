//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and tag support.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::ttl::{is_expired, now_ms};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
    /// Tags this entry is indexed under
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `expires_at` - Absolute expiry in Unix milliseconds, None = never
    /// * `tags` - Tags to index the entry under
    pub fn new(value: Value, expires_at: Option<i64>, tags: BTreeSet<String>) -> Self {
        Self {
            value,
            created_at: now_ms(),
            expires_at,
            tags,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: expired once the current time is greater than or equal
    /// to `expires_at`.
    pub fn is_expired(&self) -> bool {
        is_expired(self.expires_at)
    }
}
