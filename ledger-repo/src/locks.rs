//! In-process account row locks.
//!
//! The in-memory store serializes mutations of the same account through
//! this table. Waiting is bounded by the configured lock timeout, and an
//! entry lives only while some unit holds or waits for its row.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use ledger_types::{AccountId, RepoError};

/// Default wait before a lock attempt gives up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type Rows = Arc<DashMap<AccountId, Arc<Mutex<()>>>>;

/// One mutex per account id, created on first use.
#[derive(Debug)]
pub struct RowLocks {
    rows: Rows,
    timeout: Duration,
}

impl RowLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of rows currently held or awaited.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Waits for exclusive access to `id`.
    pub async fn acquire(&self, id: AccountId) -> Result<RowGuard, RepoError> {
        let row = self.rows.entry(id).or_default().clone();

        match tokio::time::timeout(self.timeout, row.lock_owned()).await {
            Ok(guard) => Ok(RowGuard {
                id,
                rows: self.rows.clone(),
                guard: Some(guard),
            }),
            Err(_) => {
                release(&self.rows, id);
                Err(RepoError::LockTimeout(format!("account {}", id)))
            }
        }
    }
}

/// Drops the entry for `id` once nothing but the table references it.
fn release(rows: &Rows, id: AccountId) {
    rows.remove_if(&id, |_, row| Arc::strong_count(row) == 1);
}

/// Exclusive access to one account row, released on drop.
#[derive(Debug)]
pub struct RowGuard {
    id: AccountId,
    rows: Rows,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        // The mutex guard holds a reference to the row, so unlock first.
        self.guard.take();
        release(&self.rows, self.id);
    }
}

impl Default for RowLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

/// Locks held by one unit of work. Dropping the set releases them.
#[derive(Debug, Default)]
pub struct HeldLocks {
    ids: HashSet<AccountId>,
    guards: Vec<RowGuard>,
}

impl HeldLocks {
    /// Acquires `id` unless this unit already holds it.
    pub async fn take(&mut self, locks: &RowLocks, id: AccountId) -> Result<(), RepoError> {
        if self.ids.contains(&id) {
            return Ok(());
        }
        let guard = locks.acquire(id).await?;
        self.ids.insert(id);
        self.guards.push(guard);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let locks = RowLocks::new(Duration::from_millis(20));
        let id = AccountId::new();

        let _held = locks.acquire(id).await.unwrap();
        let result = locks.acquire(id).await;
        assert!(matches!(result, Err(RepoError::LockTimeout(_))));
    }

    #[tokio::test]
    async fn test_distinct_rows_do_not_block() {
        let locks = RowLocks::new(Duration::from_millis(20));
        let _a = locks.acquire(AccountId::new()).await.unwrap();
        assert!(locks.acquire(AccountId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_held_locks_are_reentrant_per_unit() {
        let locks = RowLocks::new(Duration::from_millis(20));
        let id = AccountId::new();
        let mut held = HeldLocks::default();

        held.take(&locks, id).await.unwrap();
        held.take(&locks, id).await.unwrap();
        assert_eq!(held.len(), 1);

        drop(held);
        assert!(locks.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_rows_leave_the_table() {
        let locks = RowLocks::new(Duration::from_millis(20));
        for _ in 0..50 {
            let mut held = HeldLocks::default();
            held.take(&locks, AccountId::new()).await.unwrap();
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());

        let id = AccountId::new();
        let held = locks.acquire(id).await.unwrap();
        assert!(locks.acquire(id).await.is_err());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_row_survives_release_while_another_unit_waits() {
        let locks = Arc::new(RowLocks::new(Duration::from_secs(5)));
        let id = AccountId::new();
        let first = locks.acquire(id).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await.map(|_| ()) })
        };
        while Arc::strong_count(&locks.rows.get(&id).unwrap()) < 3 {
            tokio::task::yield_now().await;
        }

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap().unwrap();
        assert!(locks.is_empty());
    }
}
