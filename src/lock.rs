//! Per-repository advisory locks
//!
//! Three lock kinds, keyed by a 32-bit hash of the repo name:
//! - `rLock` (shared): held by searches so a repo can't be deleted under them
//! - `wLock` (exclusive, same namespace as `rLock`): held while deleting a repo
//! - `iLock` (exclusive, own namespace): held while indexing, and while deleting
//!
//! Locks are writer-preferring: once a deletion waits for `wLock`, `try_read` fails.
//! Every guard releases on drop and removes itself from the holder's status entry. The
//! last guard out removes the repo's entry from the table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::status::ThreadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
    ReadWrite,
    Indexing,
}

/// Which lock a guard holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
    Index,
}

impl LockKind {
    fn label(self) -> &'static str {
        match self {
            LockKind::Read => "rLock",
            LockKind::Write => "wLock",
            LockKind::Index => "iLock",
        }
    }
}

/// 32-bit key for a repo name
pub fn lock_key(repo: &str) -> u32 {
    let hash = blake3::hash(repo.as_bytes());
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

enum Held {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

type LockTable = Mutex<HashMap<(Namespace, u32), Arc<RwLock<()>>>>;

/// A held lock. Dropping it releases the lock.
pub struct RepoLock {
    kind: LockKind,
    label: String,
    status: Arc<ThreadStatus>,
    table: Arc<LockTable>,
    key: (Namespace, u32),
    held: Option<Held>,
}

impl RepoLock {
    pub fn kind(&self) -> LockKind {
        self.kind
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        self.held.take();
        self.status.release_lock(&self.label);
        tracing::trace!(lock = %self.label, "released");

        // entry() clones under the table lock, so a count of 1 here means no holder or waiter
        let mut table = self.table.lock();
        if table.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            table.remove(&self.key);
        }
    }
}

/// Table of per-repo locks
#[derive(Default)]
pub struct LockManager {
    locks: Arc<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, namespace: Namespace, repo: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .entry((namespace, lock_key(repo)))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn wrap(&self, kind: LockKind, repo: &str, status: &Arc<ThreadStatus>, held: Held) -> RepoLock {
        let label = format!("{} {}", kind.label(), repo);
        status.hold_lock(&label);
        tracing::trace!(lock = %label, "acquired");
        let namespace = match kind {
            LockKind::Index => Namespace::Indexing,
            LockKind::Read | LockKind::Write => Namespace::ReadWrite,
        };
        RepoLock {
            kind,
            label,
            status: status.clone(),
            table: self.locks.clone(),
            key: (namespace, lock_key(repo)),
            held: Some(held),
        }
    }

    /// Number of repo locks currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared lock, or `None` if a deletion holds or awaits the write lock
    pub fn try_read(&self, repo: &str, status: &Arc<ThreadStatus>) -> Option<RepoLock> {
        let guard = self.entry(Namespace::ReadWrite, repo).try_read_owned().ok()?;
        Some(self.wrap(LockKind::Read, repo, status, Held::Shared(guard)))
    }

    /// Shared lock, waiting for any deletion to finish
    pub async fn read(&self, repo: &str, status: &Arc<ThreadStatus>) -> RepoLock {
        status.task(&format!("acquire {} {}", LockKind::Read.label(), repo));
        let guard = self.entry(Namespace::ReadWrite, repo).read_owned().await;
        self.wrap(LockKind::Read, repo, status, Held::Shared(guard))
    }

    /// Exclusive lock, or `None` if any reader or writer holds it
    pub fn try_write(&self, repo: &str, status: &Arc<ThreadStatus>) -> Option<RepoLock> {
        let guard = self.entry(Namespace::ReadWrite, repo).try_write_owned().ok()?;
        Some(self.wrap(LockKind::Write, repo, status, Held::Exclusive(guard)))
    }

    /// Exclusive lock, waiting for readers to drain
    pub async fn write(&self, repo: &str, status: &Arc<ThreadStatus>) -> RepoLock {
        status.task(&format!("acquire {} {}", LockKind::Write.label(), repo));
        let guard = self.entry(Namespace::ReadWrite, repo).write_owned().await;
        self.wrap(LockKind::Write, repo, status, Held::Exclusive(guard))
    }

    /// The indexing lock
    pub async fn index(&self, repo: &str, status: &Arc<ThreadStatus>) -> RepoLock {
        status.task(&format!("acquire {} {}", LockKind::Index.label(), repo));
        let guard = self.entry(Namespace::Indexing, repo).write_owned().await;
        self.wrap(LockKind::Index, repo, status, Held::Exclusive(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusRegistry;
    use std::time::Duration;

    #[test]
    fn test_lock_key_is_stable() {
        assert_eq!(lock_key("github.com/a/b"), lock_key("github.com/a/b"));
        assert_ne!(lock_key("github.com/a/b"), lock_key("github.com/a/c"));
    }

    #[tokio::test]
    async fn test_readers_share_and_block_writers() {
        let registry = StatusRegistry::new();
        let handle = registry.start("test", Some("r"));
        let locks = LockManager::new();

        let first = locks.try_read("r", handle.status()).unwrap();
        let second = locks.try_read("r", handle.status()).unwrap();
        assert_eq!(second.kind(), LockKind::Read);
        assert!(locks.try_write("r", handle.status()).is_none());

        drop(first);
        drop(second);
        let write = locks.try_write("r", handle.status()).unwrap();
        assert!(locks.try_read("r", handle.status()).is_none());
        assert_eq!(handle.held_locks(), vec!["wLock r".to_string()]);
        drop(write);
        assert!(handle.held_locks().is_empty());
    }

    #[tokio::test]
    async fn test_pending_writer_makes_try_read_fail() {
        let registry = StatusRegistry::new();
        let handle = registry.start("test", Some("r"));
        let locks = Arc::new(LockManager::new());

        let reader = locks.try_read("r", handle.status()).unwrap();

        let writer_locks = locks.clone();
        let writer_status = handle.status().clone();
        let writer = tokio::spawn(async move {
            let _write = writer_locks.write("r", &writer_status).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(locks.try_read("r", handle.status()).is_none());
        drop(reader);
        writer.await.unwrap();
        assert!(locks.try_read("r", handle.status()).is_some());
    }

    #[tokio::test]
    async fn test_index_lock_is_separate_namespace() {
        let registry = StatusRegistry::new();
        let handle = registry.start("test", Some("r"));
        let locks = LockManager::new();

        let _write = locks.try_write("r", handle.status()).unwrap();
        let index = tokio::time::timeout(Duration::from_secs(1), locks.index("r", handle.status()))
            .await
            .unwrap();
        assert_eq!(index.kind(), LockKind::Index);

        let other = tokio::time::timeout(Duration::from_millis(50), locks.index("r", handle.status())).await;
        assert!(other.is_err());
    }

    #[tokio::test]
    async fn test_released_locks_leave_the_table() {
        let registry = StatusRegistry::new();
        let handle = registry.start("test", Some("r"));
        let locks = Arc::new(LockManager::new());

        let read = locks.try_read("r", handle.status()).unwrap();
        let index = locks.index("r", handle.status()).await;
        assert_eq!(locks.len(), 2);
        drop(index);
        assert_eq!(locks.len(), 1);

        let writer_locks = locks.clone();
        let writer_status = handle.status().clone();
        let writer = tokio::spawn(async move {
            let _write = writer_locks.write("r", &writer_status).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the waiting writer keeps the entry alive
        drop(read);
        writer.await.unwrap();
        assert!(locks.is_empty());
    }
}
