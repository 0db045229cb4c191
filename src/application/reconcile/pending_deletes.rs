//! 宽限期内的待提交删除
//!
//! 表中的条目只能被移除一次：计时器提交删除、重命名认领、同路径重建取消，
//! 三者谁先从表中取走条目谁就拥有它。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::novel::Fingerprint;

/// 待提交的删除
#[derive(Debug, Clone)]
pub struct PendingDelete {
    pub novel_id: Uuid,
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    /// 单调递增，越大越晚删除
    pub seq: u64,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct PendingDeletes {
    entries: DashMap<PathBuf, PendingDelete>,
    next_seq: AtomicU64,
}

impl PendingDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为路径上的小说登记一条待删除；该路径已有条目时返回 None
    pub fn register(
        &self,
        novel_id: Uuid,
        path: &Path,
        fingerprint: Fingerprint,
    ) -> Option<PendingDelete> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let entry = PendingDelete {
                    novel_id,
                    path: path.to_path_buf(),
                    fingerprint,
                    seq,
                    cancel: CancellationToken::new(),
                };
                slot.insert(entry.clone());
                Some(entry)
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<PendingDelete> {
        self.entries.get(path).map(|e| e.value().clone())
    }

    /// 指纹相同的待删除条目，最近删除的在前
    pub fn candidates(&self, fingerprint: &Fingerprint) -> Vec<PendingDelete> {
        let mut matches: Vec<PendingDelete> = self
            .entries
            .iter()
            .filter(|e| &e.value().fingerprint == fingerprint)
            .map(|e| e.value().clone())
            .collect();
        matches.sort_by(|a, b| b.seq.cmp(&a.seq));
        matches
    }

    /// 认领指定条目；条目已被他人取走（或已被替换）时返回 None
    pub fn claim(&self, path: &Path, seq: u64) -> Option<PendingDelete> {
        self.entries
            .remove_if(path, |_, entry| entry.seq == seq)
            .map(|(_, entry)| entry)
    }

    /// 认领失败的操作归还条目（计时器仍在等待它）
    pub fn restore(&self, entry: PendingDelete) {
        self.entries.entry(entry.path.clone()).or_insert(entry);
    }

    /// 同一路径文件重新出现：取走并取消其待删除
    pub fn cancel_path(&self, path: &Path) -> Option<PendingDelete> {
        let (_, entry) = self.entries.remove(path)?;
        entry.cancel.cancel();
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
