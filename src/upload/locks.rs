//! Per-session lock table
//!
//! Slice writes for a session take the shared side, merges take the
//! exclusive side. Different sessions never contend. Entries are held weakly
//! so a session's lock disappears once no guard references it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Reader/writer locks keyed by session key
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Weak<RwLock<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, session_key: &str) -> Arc<RwLock<()>> {
        let mut locks = self.inner.lock();
        if let Some(lock) = locks.get(session_key).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(RwLock::new(()));
        locks.insert(session_key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Shared access, held while a slice is written
    pub async fn shared(&self, session_key: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(session_key).read_owned().await
    }

    /// Exclusive access, held for the whole of a merge
    pub async fn exclusive(&self, session_key: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(session_key).write_owned().await
    }

    /// Number of sessions with a live lock
    pub fn active(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_exclusive_blocks_same_session() {
        let locks = SessionLocks::new();
        let guard = locks.exclusive("abc").await;

        let contender = locks.clone();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            async move { contender.exclusive("abc").await },
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = locks.exclusive("abc").await;
    }

    #[tokio::test]
    async fn test_shared_allows_concurrent_writers() {
        let locks = SessionLocks::new();
        let _a = locks.shared("abc").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.shared("abc")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let locks = SessionLocks::new();
        let _a = locks.exclusive("abc").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.exclusive("def")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_entries_released_with_guards() {
        let locks = SessionLocks::new();
        {
            let _a = locks.exclusive("abc").await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}
