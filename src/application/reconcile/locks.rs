//! 变更锁
//!
//! - 按小说 ID：保护 读取指纹 → 解析 → 替换章节 这一序列，同一小说的慢解析不会与后续修改交错
//! - 按路径：同一路径上的事件依次处理，重命名同时锁住两端

use dashmap::DashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub struct KeyedLocks<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

pub type NovelLocks = KeyedLocks<Uuid>;
pub type PathLocks = KeyedLocks<PathBuf>;

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个键的锁，持有 guard 期间其他调用方等待
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// 回收锁；仍有人持有或等待时保留
    pub fn forget(&self, key: &K) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl PathLocks {
    /// 按路径排序依次加锁，两个方向相反的重命名不会互相等待
    pub async fn lock_all(&self, paths: &[&Path]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<PathBuf> = paths.iter().map(|p| p.to_path_buf()).collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for path in sorted {
            guards.push(self.lock(path).await);
        }
        guards
    }

    pub fn forget_all(&self, paths: &[&Path]) {
        for path in paths {
            self.forget(&path.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_novel_is_serialized() {
        let locks = Arc::new(NovelLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_novels_do_not_block() {
        let locks = NovelLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let _b = locks.lock(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_forget_keeps_held_locks() {
        let locks = NovelLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        locks.forget(&id);
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.forget(&id);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_rename_locks_both_ends() {
        let locks = Arc::new(PathLocks::new());
        let a = Path::new("/lib/a.txt");
        let b = Path::new("/lib/b.txt");

        let guards = locks.lock_all(&[a, b]).await;
        assert_eq!(guards.len(), 2);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guards = locks.lock_all(&[Path::new("/lib/b.txt")]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guards);
        waiter.await.unwrap();
        locks.forget_all(&[a, b]);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_opposite_renames_do_not_deadlock() {
        let locks = Arc::new(PathLocks::new());
        let tasks: Vec<_> = [("/lib/a.txt", "/lib/b.txt"), ("/lib/b.txt", "/lib/a.txt")]
            .into_iter()
            .map(|(from, to)| {
                let locks = locks.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let _guards = locks.lock_all(&[Path::new(from), Path::new(to)]).await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_duplicate_paths_lock_once() {
        let locks = PathLocks::new();
        let a = Path::new("/lib/a.txt");
        let guards = locks.lock_all(&[a, a]).await;
        assert_eq!(guards.len(), 1);
    }
}
