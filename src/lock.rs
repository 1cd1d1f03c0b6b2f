//! Lock Manager
//!
//! Mutual exclusion built on any [`CacheStore`]: a lock is a key holding a random
//! owner token, written with set-if-absent and removed with compare-and-delete.
//! The in-memory driver gives exclusion within one process only.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::contracts::CacheStore;
use crate::error::{CacheError, Result};
use crate::ttl::{calculate_expiration, parse_ttl, Ttl};

// == Defaults ==
/// How long a lock is held when no timeout is given
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;
/// Retries after the first failed attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Wait between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// == Lock Options ==
/// Options for [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// How long the lock is held once acquired (its TTL), not an acquisition deadline
    pub timeout: Ttl,
    /// Attempts after the first one; 0 tries exactly once
    pub max_retries: u32,
    /// Sleep between attempts
    pub retry_interval: Duration,
}

impl LockOptions {
    /// Default options with the given hold duration.
    pub fn new(timeout: impl Into<Ttl>) -> Self {
        Self {
            timeout: timeout.into(),
            ..Self::default()
        }
    }

    /// Sets how many attempts follow the first failed one.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the wait between attempts.
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Ttl::Seconds(DEFAULT_LOCK_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

// == Lock Handle ==
/// Result of an acquisition attempt.
///
/// Check [`Lock::acquired`]; an unacquired handle is a normal outcome and its
/// `release` does nothing.
#[derive(Debug)]
pub struct Lock<S: ?Sized> {
    key: String,
    owner: String,
    expires_at: Option<i64>,
    acquired: bool,
    released: AtomicBool,
    store: Arc<S>,
}

impl<S: CacheStore + ?Sized> Lock<S> {
    // == Accessors ==
    /// Store key the lock lives under, prefix included.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token stored under the key while this handle owns it.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Unix milliseconds at which the lock lapses; `None` when not acquired.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Returns true when this handle took the lock.
    pub fn acquired(&self) -> bool {
        self.acquired
    }

    // == Release ==
    /// Deletes the lock key if it still holds this handle's token.
    ///
    /// Returns whether this call removed it. Calling it again, or on a handle
    /// that never acquired, returns `Ok(false)`.
    pub async fn release(&self) -> Result<bool> {
        if !self.acquired || self.released.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let token = Value::String(self.owner.clone());
        match self.store.forget_if(&self.key, &token).await {
            Ok(true) => {
                debug!(key = %self.key, "Lock released");
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    key = %self.key,
                    "Lock lapsed before release; leaving the current holder in place"
                );
                Ok(false)
            }
            Err(err) => {
                // Allow another release attempt after a driver failure
                self.released.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }
}

// == Lock Manager ==
/// Acquires locks against a shared store.
#[derive(Debug)]
pub struct LockManager<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CacheStore + ?Sized> LockManager<S> {
    // == Constructor ==
    /// Creates a manager storing its locks in `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // == Acquire ==
    /// Tries to take `key`, retrying up to `options.max_retries` times.
    ///
    /// Exhausting the retries returns an unacquired handle, not an error. Fails only
    /// on an invalid or zero timeout, or a driver error.
    pub async fn acquire(&self, key: &str, options: &LockOptions) -> Result<Lock<S>> {
        if parse_ttl(&options.timeout)? == 0 {
            return Err(CacheError::InvalidTtl(format!(
                "lock timeout must be positive, got {}",
                options.timeout
            )));
        }

        let owner = Uuid::new_v4().to_string();
        let token = Value::String(owner.clone());
        let attempts = options.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            // Resolved before the write so the handle never outlives the stored key
            let expires_at = calculate_expiration(&options.timeout)?;
            if self
                .store
                .add(key, token.clone(), Some(options.timeout.clone()))
                .await?
            {
                debug!(key, attempt, "Lock acquired");
                return Ok(Lock {
                    key: key.to_string(),
                    owner,
                    expires_at: Some(expires_at),
                    acquired: true,
                    released: AtomicBool::new(false),
                    store: Arc::clone(&self.store),
                });
            }

            if attempt < attempts {
                trace!(key, attempt, "Lock busy, retrying");
                tokio::time::sleep(options.retry_interval).await;
            }
        }

        debug!(key, attempts, "Lock not acquired");
        Ok(Lock {
            key: key.to_string(),
            owner,
            expires_at: None,
            acquired: false,
            released: AtomicBool::new(false),
            store: Arc::clone(&self.store),
        })
    }

    // == Lock And Run ==
    /// Runs `f` while holding `key` for at most `ttl`, releasing on every exit path.
    ///
    /// Fails with [`CacheError::LockNotAcquired`] when the lock cannot be taken with
    /// the default retry policy. The callback's own error wins over a release error.
    /// If `f` panics or this future is dropped mid-run, the release is spawned onto
    /// the current tokio runtime.
    pub async fn lock_and_run<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: impl Into<Ttl>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        S: 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        let lock = self.acquire(key, &LockOptions::new(ttl)).await?;
        if !lock.acquired() {
            return Err(CacheError::LockNotAcquired(key.to_string()).into());
        }

        let mut guard = ReleaseOnDrop::new(&lock);
        let outcome = f().await;
        let released = lock.release().await;
        guard.disarm();

        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(key, error = %release_err, "Failed to release lock after callback error");
                Err(err)
            }
        }
    }
}

// == Release Guard ==
/// Releases an acquired lock from `Drop` unless disarmed first.
///
/// Covers the exits `lock_and_run` cannot await on: a panicking callback and a
/// cancelled caller. The release is compare-and-delete, so a late run after the
/// key lapsed or changed hands leaves the new holder alone.
struct ReleaseOnDrop<S: CacheStore + ?Sized + 'static> {
    key: String,
    token: Value,
    store: Arc<S>,
    armed: bool,
}

impl<S: CacheStore + ?Sized + 'static> ReleaseOnDrop<S> {
    fn new(lock: &Lock<S>) -> Self {
        Self {
            key: lock.key.clone(),
            token: Value::String(lock.owner.clone()),
            store: Arc::clone(&lock.store),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S: CacheStore + ?Sized + 'static> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        let store = Arc::clone(&self.store);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match store.forget_if(&key, &token).await {
                        Ok(released) => {
                            debug!(key = %key, released, "Released lock after abandoned run")
                        }
                        Err(err) => {
                            warn!(key = %key, error = %err, "Failed to release abandoned lock")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime to release abandoned lock; it lapses at its timeout");
            }
        }
    }
}
