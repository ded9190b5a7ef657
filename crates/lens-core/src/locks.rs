//! Per-connection mutual exclusion for graph rebuilds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Table = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Serializes work per connection id.
///
/// Cloning shares the underlying table, so every synchronizer built from the
/// same `ConnectionLocks` waits on the same per-connection mutex. A
/// connection's entry is removed once its last holder and waiter are gone.
#[derive(Clone, Default)]
pub struct ConnectionLocks {
    inner: Table,
}

impl ConnectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, connection_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(connection_id.to_string()).or_default())
    }

    fn guard(&self, connection_id: &str, guard: OwnedMutexGuard<()>) -> ConnectionGuard {
        ConnectionGuard {
            guard: Some(guard),
            connection_id: connection_id.to_string(),
            table: Arc::clone(&self.inner),
        }
    }

    /// Wait until no other holder exists for `connection_id`.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, connection_id: &str) -> ConnectionGuard {
        let guard = self.slot(connection_id).lock_owned().await;
        self.guard(connection_id, guard)
    }

    /// Acquire without waiting, or `None` if a run is already in flight.
    pub fn try_acquire(&self, connection_id: &str) -> Option<ConnectionGuard> {
        let guard = self.slot(connection_id).try_lock_owned().ok()?;
        Some(self.guard(connection_id, guard))
    }

    /// Connections with a live entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Drop the entry for `connection_id` when only the table still references it.
fn prune(table: &Table, connection_id: &str) {
    let mut map = table.lock().unwrap_or_else(PoisonError::into_inner);
    if map.get(connection_id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        map.remove(connection_id);
    }
}

/// Held for the duration of a connection's exclusive run.
pub struct ConnectionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    connection_id: String,
    table: Table,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference is not counted.
        self.guard.take();
        prune(&self.table, &self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_connection_is_serialized() {
        let locks = ConnectionLocks::new();
        let guard = locks.acquire("conn-a").await;

        assert!(locks.try_acquire("conn-a").is_none());
        drop(guard);
        assert!(locks.try_acquire("conn-a").is_some());
    }

    #[tokio::test]
    async fn test_connections_do_not_block_each_other() {
        let locks = ConnectionLocks::new();
        let _a = locks.acquire("conn-a").await;
        let shared = locks.clone();
        assert!(shared.try_acquire("conn-b").is_some());
    }

    #[tokio::test]
    async fn test_released_connections_leave_the_table() {
        let locks = ConnectionLocks::new();
        for n in 0..50 {
            let _guard = locks.acquire(&format!("conn-{n}")).await;
        }
        assert_eq!(locks.tracked(), 0);

        let held = locks.acquire("conn-a").await;
        assert!(locks.try_acquire("conn-a").is_none());
        assert_eq!(locks.tracked(), 1);
        drop(held);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = ConnectionLocks::new();
        let held = locks.acquire("conn-a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("conn-a").await;
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        assert!(locks.tracked() <= 1);

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
