//! TTL Cleanup Task
//!
//! Background task that periodically removes expired entries from a memory store.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::StoreState;

/// Spawns a task that purges expired entries every `interval`.
///
/// The task holds a weak reference and exits on its own once the store state is
/// dropped. Abort the returned handle to stop it earlier.
pub(crate) fn spawn_cleanup_task(
    state: Weak<Mutex<StoreState>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting TTL cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let Some(state) = state.upgrade() else {
                debug!("Store dropped, stopping TTL cleanup task");
                break;
            };

            let removed = state.lock().await.purge_expired();

            if removed > 0 {
                info!(removed, "TTL cleanup removed expired entries");
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use serde_json::json;

    use crate::cache::MemoryCacheStore;
    use crate::contracts::CacheStore;

    fn store() -> MemoryCacheStore {
        MemoryCacheStore::new(NonZeroUsize::new(100).unwrap())
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let store = store();
        store
            .put("expire_soon", json!("value"), Some("1s".into()))
            .await
            .unwrap();

        store.spawn_cleanup(Duration::from_millis(200)).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Removed by the sweep, not by a read
        assert_eq!(store.len().await, 0);
        assert_eq!(store.stats().await.expirations, 1);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let store = store();
        store
            .put("long_lived", json!("value"), Some("1h".into()))
            .await
            .unwrap();

        store.spawn_cleanup(Duration::from_millis(200)).unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(store.get("long_lived").await.unwrap(), Some(json!("value")));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_stopped() {
        let store = store();
        store.spawn_cleanup(Duration::from_secs(1)).unwrap();
        assert!(store.has_cleanup_task());

        store.close().await.unwrap();
        assert!(!store.has_cleanup_task());
    }

    #[tokio::test]
    async fn test_cleanup_task_exits_when_state_dropped() {
        let state = Arc::new(Mutex::new(StoreState::new(NonZeroUsize::new(10).unwrap())));
        let handle = spawn_cleanup_task(Arc::downgrade(&state), Duration::from_millis(50));
        drop(state);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup task should exit once the state is gone")
            .unwrap();
    }
}
