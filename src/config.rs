//! Configuration Module
//!
//! Construction options for a [`CacheManager`](crate::CacheManager), loadable from
//! environment variables.

use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Driver ==
/// Backing implementation selected by the `driver` option.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// Bounded in-process store
    #[default]
    Memory,
}

impl CacheDriver {
    /// Lowercase name as accepted by `CACHE_DRIVER`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDriver::Memory => "memory",
        }
    }
}

impl fmt::Display for CacheDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheDriver {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheDriver::Memory),
            _ => Err(CacheError::InvalidConfig(format!("unknown cache driver: {s}"))),
        }
    }
}

// == Cache Config ==
/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backing implementation
    pub driver: CacheDriver,
    /// Prepended to every key and tag, isolating logical caches on one store
    pub prefix: String,
    /// Maximum number of entries the memory driver holds before evicting
    pub max_size: usize,
    /// Seconds between background sweeps of expired entries; None disables the sweep
    pub cleanup_interval: Option<u64>,
}

impl CacheConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DRIVER` - Backing driver (default: memory)
    /// - `CACHE_PREFIX` - Key prefix (default: empty)
    /// - `CACHE_MAX_SIZE` - Memory driver entry bound (default: 1000)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep interval in seconds (default: disabled)
    ///
    /// Unset variables take their defaults; malformed ones are rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            driver: parse_var(&lookup, "CACHE_DRIVER")?.unwrap_or(defaults.driver),
            prefix: lookup("CACHE_PREFIX").unwrap_or(defaults.prefix),
            max_size: parse_var(&lookup, "CACHE_MAX_SIZE")?.unwrap_or(defaults.max_size),
            cleanup_interval: parse_var(&lookup, "CACHE_CLEANUP_INTERVAL")?
                .or(defaults.cleanup_interval),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks option ranges.
    pub fn validate(&self) -> Result<()> {
        self.max_size_non_zero()?;
        if self.cleanup_interval == Some(0) {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// `max_size` as a [`NonZeroUsize`], rejecting 0.
    pub fn max_size_non_zero(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.max_size)
            .ok_or_else(|| CacheError::InvalidConfig("max_size must be at least 1".to_string()))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::Memory,
            prefix: String::new(),
            max_size: crate::cache::DEFAULT_MAX_SIZE.get(),
            cleanup_interval: None,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CacheError::InvalidConfig(format!("{name}={raw:?}: {e}"))),
    }
}
