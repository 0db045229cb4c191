//! 协调引擎
//!
//! 消费规范化的文件事件，把存储收敛到磁盘的真实状态：
//! - Created/Modified: 指纹未变则不写存储；变化则重新解析并整体替换章节
//! - Deleted: 进入宽限期，期间出现指纹相同的新文件视为重命名
//! - Renamed: 只更新路径，章节保持不变
//!
//! 存储是唯一的事实来源，路径状态只在存储确认写入后更新。
//! 同一路径上的事件（重命名的两端都算）依次处理，不论来自哪个 Worker 通道。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::locks::{NovelLocks, PathLocks};
use super::pending_deletes::{PendingDelete, PendingDeletes};
use crate::application::error::ReconcileError;
use crate::application::ports::{
    ChapterRecord, DocumentParserPort, FileEvent, NovelRecord, NovelRepositoryPort,
    ParseRequest, ParsedDocument, RepositoryError, TextCachePort,
};
use crate::domain::novel::{Fingerprint, SourceFormat};

const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// 删除提交遇到存储错误时的最多尝试次数
const COMMIT_ATTEMPTS: u32 = 5;

/// 协调配置
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// 删除提交前等待匹配创建的时间
    pub grace_window: Duration,
    /// 读取失败后的重试次数
    pub io_retries: u32,
    /// 首次重试前的等待，之后每次翻倍
    pub io_backoff: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_millis(1500),
            io_retries: 3,
            io_backoff: Duration::from_millis(100),
        }
    }
}

/// 单个路径的协调状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    Unknown,
    /// 存储中的章节与该指纹对应
    Tracked {
        novel_id: Uuid,
        fingerprint: Fingerprint,
    },
    /// 已观察到内容变化，重新解析进行中
    Stale { novel_id: Uuid },
    /// 文件已消失；`committed` 为 false 时仍在宽限期内
    Removed { novel_id: Uuid, committed: bool },
}

/// 协调结果（同时广播给订阅者）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// 章节已（重新）写入
    Indexed {
        novel_id: Uuid,
        path: PathBuf,
        chapters: usize,
        created: bool,
    },
    /// 指纹未变，没有任何存储写入
    Unchanged { novel_id: Uuid, path: PathBuf },
    Renamed {
        novel_id: Uuid,
        from: PathBuf,
        to: PathBuf,
    },
    DeletionPending { novel_id: Uuid, path: PathBuf },
    /// 宽限期结束，删除已提交
    Removed { novel_id: Uuid, path: PathBuf },
    Ignored { path: PathBuf },
}

impl ReconcileOutcome {
    pub fn novel_id(&self) -> Option<Uuid> {
        match self {
            ReconcileOutcome::Indexed { novel_id, .. }
            | ReconcileOutcome::Unchanged { novel_id, .. }
            | ReconcileOutcome::Renamed { novel_id, .. }
            | ReconcileOutcome::DeletionPending { novel_id, .. }
            | ReconcileOutcome::Removed { novel_id, .. } => Some(*novel_id),
            ReconcileOutcome::Ignored { .. } => None,
        }
    }
}

/// 一次读取得到的文件内容
struct FileSnapshot {
    bytes: Vec<u8>,
    fingerprint: Fingerprint,
    modified_at: Option<DateTime<Utc>>,
}

impl FileSnapshot {
    async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let modified_at = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);
        let fingerprint = Fingerprint::of(&bytes);
        Ok(Self {
            bytes,
            fingerprint,
            modified_at,
        })
    }
}

/// 新路径上的内容可能来自的旧小说
enum RenameSource {
    /// 宽限期内的待删除
    Pending(PendingDelete),
    /// 存储中仍在跟踪、但文件已不存在（删除事件尚未到达）
    Vanished(NovelRecord),
}

impl RenameSource {
    fn novel_id(&self) -> Uuid {
        match self {
            RenameSource::Pending(entry) => entry.novel_id,
            RenameSource::Vanished(novel) => novel.id,
        }
    }

    fn path(&self) -> &Path {
        match self {
            RenameSource::Pending(entry) => &entry.path,
            RenameSource::Vanished(novel) => &novel.file_path,
        }
    }
}

struct Inner {
    repo: Arc<dyn NovelRepositoryPort>,
    parser: Arc<dyn DocumentParserPort>,
    text_cache: Arc<dyn TextCachePort>,
    config: ReconcileConfig,
    pending: PendingDeletes,
    locks: NovelLocks,
    path_locks: PathLocks,
    states: DashMap<PathBuf, PathState>,
    outcomes: broadcast::Sender<ReconcileOutcome>,
}

/// 协调引擎
///
/// 可廉价克隆；所有克隆共享同一份待删除表、锁表与路径状态。
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn NovelRepositoryPort>,
        parser: Arc<dyn DocumentParserPort>,
        text_cache: Arc<dyn TextCachePort>,
        config: ReconcileConfig,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                repo,
                parser,
                text_cache,
                config,
                pending: PendingDeletes::new(),
                locks: NovelLocks::new(),
                path_locks: PathLocks::new(),
                states: DashMap::new(),
                outcomes,
            }),
        }
    }

    /// 订阅协调结果
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileOutcome> {
        self.inner.outcomes.subscribe()
    }

    pub fn path_state(&self, path: &Path) -> PathState {
        self.inner
            .states
            .get(path)
            .map(|s| s.value().clone())
            .unwrap_or(PathState::Unknown)
    }

    /// 宽限期内尚未提交的删除数
    pub fn pending_deletes(&self) -> usize {
        self.inner.pending.len()
    }

    /// 协调一个文件事件
    ///
    /// 解析失败与歧义重命名在内部消化；只有存储失败会返回错误，
    /// 此时路径状态保持不变，后续事件会重新尝试收敛。
    pub async fn handle(&self, event: FileEvent) -> Result<ReconcileOutcome, ReconcileError> {
        tracing::debug!(event = %event, "Reconciling file event");

        let paths = event.paths();
        let guards = self.inner.path_locks.lock_all(&paths).await;

        let result = match &event {
            FileEvent::Created { path } | FileEvent::Modified { path } => {
                self.sync_path(path).await
            }
            FileEvent::Deleted { path } => self.mark_deleted(path).await,
            FileEvent::Renamed { from, to } => self.apply_rename(from, to).await,
        };

        drop(guards);
        self.inner.path_locks.forget_all(&paths);

        let outcome = result?;
        self.publish(&outcome);
        Ok(outcome)
    }

    // ========================================================================
    // Created / Modified
    // ========================================================================

    async fn sync_path(&self, path: &Path) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(format) = SourceFormat::from_path(path) else {
            return Ok(ReconcileOutcome::Ignored {
                path: path.to_path_buf(),
            });
        };

        match self.inner.repo.find_by_path(path).await? {
            Some(novel) => self.refresh(novel.id, path, format).await,
            None => {
                let snapshot = match self.read_file(path).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => return self.on_io_failure(path, e).await,
                };
                self.ingest_or_relocate(path, format, snapshot).await
            }
        }
    }

    /// 已跟踪路径：指纹相同则跳过，否则重新解析
    async fn refresh(
        &self,
        novel_id: Uuid,
        path: &Path,
        format: SourceFormat,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let guard = self.inner.locks.lock(novel_id).await;

        let snapshot = match self.read_file(path).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                drop(guard);
                return self.on_io_failure(path, e).await;
            }
        };

        let current = match self.inner.repo.find_by_id(novel_id).await? {
            Some(novel) if novel.file_path == path => novel,
            _ => {
                // 等锁期间小说已被删除或移走
                drop(guard);
                return self.ingest_or_relocate(path, format, snapshot).await;
            }
        };

        let fingerprint = snapshot.fingerprint.clone();

        if current.is_indexed_as(&fingerprint) {
            self.cancel_pending(path);
            self.set_state(
                path,
                PathState::Tracked {
                    novel_id,
                    fingerprint,
                },
            );
            tracing::debug!(
                novel_id = %novel_id,
                path = %path.display(),
                "Fingerprint unchanged, skipping re-parse"
            );
            return Ok(ReconcileOutcome::Unchanged {
                novel_id,
                path: path.to_path_buf(),
            });
        }

        let previous = self.path_state(path);
        self.set_state(path, PathState::Stale { novel_id });

        match self.reindex(&current, format, snapshot).await {
            Ok(chapters) => {
                self.cancel_pending(path);
                self.set_state(
                    path,
                    PathState::Tracked {
                        novel_id,
                        fingerprint: fingerprint.clone(),
                    },
                );
                tracing::info!(
                    novel_id = %novel_id,
                    path = %path.display(),
                    fingerprint = %fingerprint.short(),
                    chapters = chapters,
                    "Novel re-indexed"
                );
                Ok(ReconcileOutcome::Indexed {
                    novel_id,
                    path: path.to_path_buf(),
                    chapters,
                    created: false,
                })
            }
            Err(e) => {
                self.restore_state(path, previous);
                Err(e)
            }
        }
    }

    /// 重新解析并写入章节与元数据，返回章节数
    async fn reindex(
        &self,
        current: &NovelRecord,
        format: SourceFormat,
        snapshot: FileSnapshot,
    ) -> Result<usize, ReconcileError> {
        let FileSnapshot {
            bytes,
            fingerprint,
            modified_at,
        } = snapshot;

        let parsed = self.parse(&current.file_path, format, bytes).await?;
        self.cache_text(&fingerprint, &parsed).await;

        // 章节先行：失败时修改时间仍是旧值，重启基线会再次报告该文件
        let chapters = chapter_records(current.id, &parsed);
        self.inner
            .repo
            .replace_chapters(current.id, &fingerprint, &chapters)
            .await?;

        let mut record = current.clone();
        record.title = parsed.title.clone();
        record.author = parsed.author.clone();
        record.format = format;
        record.modified_at = modified_at;
        record.updated_at = Utc::now();
        self.inner.repo.upsert_novel(&record).await?;

        Ok(chapters.len())
    }

    /// 未跟踪路径：先尝试识别为重命名，否则作为新小说入库
    async fn ingest_or_relocate(
        &self,
        path: &Path,
        format: SourceFormat,
        snapshot: FileSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if let Some(source) = self.find_rename_source(path, &snapshot.fingerprint).await? {
            if let Some(outcome) = self.relocate(source, path, &snapshot.fingerprint).await? {
                return Ok(outcome);
            }
        }

        self.ingest_new(path, format, snapshot).await
    }

    async fn find_rename_source(
        &self,
        path: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<Option<RenameSource>, ReconcileError> {
        let candidates: Vec<PendingDelete> = self
            .inner
            .pending
            .candidates(fingerprint)
            .into_iter()
            .filter(|c| c.path != path)
            .collect();

        if candidates.len() > 1 {
            tracing::warn!(
                path = %path.display(),
                fingerprint = %fingerprint.short(),
                candidates = candidates.len(),
                chosen = %candidates[0].path.display(),
                "Ambiguous rename, preferring the most recently deleted novel"
            );
        }

        if let Some(candidate) = candidates.into_iter().next() {
            return Ok(Some(RenameSource::Pending(candidate)));
        }

        for novel in self.inner.repo.find_by_fingerprint(fingerprint).await? {
            if novel.file_path == path {
                continue;
            }
            if matches!(tokio::fs::try_exists(&novel.file_path).await, Ok(false)) {
                return Ok(Some(RenameSource::Vanished(novel)));
            }
        }

        Ok(None)
    }

    /// 把旧小说移到新路径；来源已被删除提交时返回 None
    async fn relocate(
        &self,
        source: RenameSource,
        to: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ReconcileOutcome>, ReconcileError> {
        let novel_id = source.novel_id();
        let _guard = self.inner.locks.lock(novel_id).await;

        let claimed = match &source {
            RenameSource::Pending(entry) => {
                match self.inner.pending.claim(&entry.path, entry.seq) {
                    Some(claimed) => Some(claimed),
                    None => {
                        tracing::debug!(
                            novel_id = %novel_id,
                            path = %to.display(),
                            "Rename candidate already committed, ingesting as new"
                        );
                        return Ok(None);
                    }
                }
            }
            RenameSource::Vanished(_) => None,
        };

        let from = source.path().to_path_buf();

        match self.inner.repo.rename_path(novel_id, to).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound(_)) if claimed.is_none() => return Ok(None),
            Err(e) => {
                if let Some(entry) = claimed {
                    self.inner.pending.restore(entry);
                }
                return Err(e.into());
            }
        }

        match claimed {
            Some(entry) => entry.cancel.cancel(),
            None => self.release_pending(novel_id, &from),
        }

        self.inner.states.remove(&from);
        self.set_state(
            to,
            PathState::Tracked {
                novel_id,
                fingerprint: fingerprint.clone(),
            },
        );

        tracing::info!(
            novel_id = %novel_id,
            from = %from.display(),
            to = %to.display(),
            "Rename detected by fingerprint"
        );

        Ok(Some(ReconcileOutcome::Renamed {
            novel_id,
            from,
            to: to.to_path_buf(),
        }))
    }

    async fn ingest_new(
        &self,
        path: &Path,
        format: SourceFormat,
        snapshot: FileSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let FileSnapshot {
            bytes,
            fingerprint,
            modified_at,
        } = snapshot;

        let parsed = self.parse(path, format, bytes).await?;
        let record = NovelRecord::new(
            path.to_path_buf(),
            format,
            parsed.title.clone(),
            parsed.author.clone(),
            fingerprint.clone(),
            modified_at,
        );

        let novel_id = self.inner.repo.upsert_novel(&record).await?;
        let _guard = self.inner.locks.lock(novel_id).await;

        self.cache_text(&fingerprint, &parsed).await;
        let chapters = chapter_records(novel_id, &parsed);
        self.inner
            .repo
            .replace_chapters(novel_id, &fingerprint, &chapters)
            .await?;

        self.set_state(
            path,
            PathState::Tracked {
                novel_id,
                fingerprint: fingerprint.clone(),
            },
        );

        tracing::info!(
            novel_id = %novel_id,
            path = %path.display(),
            title = %record.title,
            fingerprint = %fingerprint.short(),
            chapters = chapters.len(),
            "Novel indexed"
        );

        Ok(ReconcileOutcome::Indexed {
            novel_id,
            path: path.to_path_buf(),
            chapters: chapters.len(),
            created: novel_id == record.id,
        })
    }

    // ========================================================================
    // Deleted
    // ========================================================================

    async fn mark_deleted(&self, path: &Path) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(found) = self.inner.repo.find_by_path(path).await? else {
            self.inner.states.remove(path);
            tracing::debug!(path = %path.display(), "Deleted path was not tracked");
            return Ok(ReconcileOutcome::Ignored {
                path: path.to_path_buf(),
            });
        };

        let _guard = self.inner.locks.lock(found.id).await;

        // 等锁期间可能已被识别为重命名并移走
        let novel = match self.inner.repo.find_by_id(found.id).await? {
            Some(novel) if novel.file_path == path => novel,
            moved => {
                tracing::debug!(
                    novel_id = %found.id,
                    path = %path.display(),
                    now_at = ?moved.map(|n| n.file_path),
                    "Novel left the deleted path, nothing to remove"
                );
                return Ok(ReconcileOutcome::Ignored {
                    path: path.to_path_buf(),
                });
            }
        };

        let Some(entry) = self
            .inner
            .pending
            .register(novel.id, path, novel.fingerprint.clone())
        else {
            tracing::debug!(
                novel_id = %novel.id,
                path = %path.display(),
                "Deletion already pending"
            );
            return Ok(ReconcileOutcome::DeletionPending {
                novel_id: novel.id,
                path: path.to_path_buf(),
            });
        };

        self.set_state(
            path,
            PathState::Removed {
                novel_id: novel.id,
                committed: false,
            },
        );
        self.spawn_commit_timer(entry);

        tracing::info!(
            novel_id = %novel.id,
            path = %path.display(),
            grace_ms = self.inner.config.grace_window.as_millis() as u64,
            "Deletion pending"
        );

        Ok(ReconcileOutcome::DeletionPending {
            novel_id: novel.id,
            path: path.to_path_buf(),
        })
    }

    /// 宽限期计时器；存储失败时条目已归还，再等一个宽限期重试
    fn spawn_commit_timer(&self, entry: PendingDelete) {
        let engine = self.clone();
        let grace = self.inner.config.grace_window;

        tokio::spawn(async move {
            for attempt in 1..=COMMIT_ATTEMPTS {
                tokio::select! {
                    _ = entry.cancel.cancelled() => {
                        tracing::debug!(
                            novel_id = %entry.novel_id,
                            path = %entry.path.display(),
                            "Pending deletion cancelled"
                        );
                        return;
                    }
                    _ = tokio::time::sleep(grace) => {}
                }

                match engine.commit_delete(&entry).await {
                    Ok(Some(outcome)) => {
                        engine.publish(&outcome);
                        return;
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(
                            novel_id = %entry.novel_id,
                            path = %entry.path.display(),
                            attempt = attempt,
                            error = %e,
                            "Failed to commit deletion, will retry"
                        );
                    }
                }
            }

            // 放弃后移除条目：之后的删除事件或重启基线会重新发起
            if engine.inner.pending.claim(&entry.path, entry.seq).is_some() {
                tracing::error!(
                    novel_id = %entry.novel_id,
                    path = %entry.path.display(),
                    attempts = COMMIT_ATTEMPTS,
                    "Giving up on deletion after repeated storage failures"
                );
            }
        });
    }

    /// 宽限期结束：认领条目成功才删除，保证只提交一次
    async fn commit_delete(
        &self,
        entry: &PendingDelete,
    ) -> Result<Option<ReconcileOutcome>, ReconcileError> {
        let guard = self.inner.locks.lock(entry.novel_id).await;

        let Some(entry) = self.inner.pending.claim(&entry.path, entry.seq) else {
            return Ok(None);
        };

        match self.inner.repo.find_by_id(entry.novel_id).await {
            Ok(Some(novel)) if novel.file_path != entry.path => {
                self.inner.states.remove_if(&entry.path, |_, state| {
                    matches!(state, PathState::Removed { novel_id, .. } if *novel_id == entry.novel_id)
                });
                tracing::info!(
                    novel_id = %entry.novel_id,
                    path = %entry.path.display(),
                    now_at = %novel.file_path.display(),
                    "Novel moved during grace window, deletion skipped"
                );
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) => {
                self.inner.pending.restore(entry);
                return Err(e.into());
            }
        }

        let deleted = match self.inner.repo.delete_novel(entry.novel_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.inner.pending.restore(entry);
                return Err(e.into());
            }
        };

        self.evict_orphaned_text(&entry.fingerprint).await;

        self.set_state(
            &entry.path,
            PathState::Removed {
                novel_id: entry.novel_id,
                committed: true,
            },
        );
        drop(guard);
        self.inner.locks.forget(&entry.novel_id);

        tracing::info!(
            novel_id = %entry.novel_id,
            path = %entry.path.display(),
            deleted = deleted,
            "Deletion committed"
        );

        Ok(Some(ReconcileOutcome::Removed {
            novel_id: entry.novel_id,
            path: entry.path,
        }))
    }

    // ========================================================================
    // Renamed
    // ========================================================================

    async fn apply_rename(
        &self,
        from: &Path,
        to: &Path,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if SourceFormat::from_path(to).is_none() {
            return self.mark_deleted(from).await;
        }

        let Some(found) = self.inner.repo.find_by_path(from).await? else {
            return self.sync_path(to).await;
        };

        let guard = self.inner.locks.lock(found.id).await;

        // 等锁期间已被识别为重命名移走
        let novel = match self.inner.repo.find_by_id(found.id).await? {
            Some(novel) if novel.file_path == from => novel,
            _ => {
                drop(guard);
                return self.sync_path(to).await;
            }
        };

        if let Some(occupant) = self.inner.repo.find_by_path(to).await? {
            if occupant.id != novel.id {
                self.remove_occupant(occupant, to).await?;
            }
        }

        self.inner.repo.rename_path(novel.id, to).await?;
        self.inner.pending.cancel_path(from);
        self.inner.states.remove(from);
        self.set_state(
            to,
            PathState::Tracked {
                novel_id: novel.id,
                fingerprint: novel.fingerprint.clone(),
            },
        );
        drop(guard);

        tracing::info!(
            novel_id = %novel.id,
            from = %from.display(),
            to = %to.display(),
            "Novel renamed"
        );

        // 内容可能随移动一起改变
        let refreshed = self.sync_path(to).await?;
        if !matches!(refreshed, ReconcileOutcome::Unchanged { .. }) {
            self.publish(&refreshed);
        }

        Ok(ReconcileOutcome::Renamed {
            novel_id: novel.id,
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
    }

    /// 重命名目标上原有的小说被覆盖：立即删除并广播
    async fn remove_occupant(
        &self,
        occupant: NovelRecord,
        path: &Path,
    ) -> Result<(), ReconcileError> {
        let guard = self.inner.locks.lock(occupant.id).await;

        self.inner.repo.delete_novel(occupant.id).await?;
        self.inner.pending.cancel_path(path);
        self.evict_orphaned_text(&occupant.fingerprint).await;

        drop(guard);
        self.inner.locks.forget(&occupant.id);

        tracing::info!(
            novel_id = %occupant.id,
            path = %path.display(),
            "Rename destination replaced, previous novel removed"
        );
        self.publish(&ReconcileOutcome::Removed {
            novel_id: occupant.id,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// 没有小说再引用该指纹时丢弃解码文本缓存
    async fn evict_orphaned_text(&self, fingerprint: &Fingerprint) {
        match self.inner.repo.find_by_fingerprint(fingerprint).await {
            Ok(remaining) if remaining.is_empty() => {
                if let Err(e) = self.inner.text_cache.remove(fingerprint).await {
                    tracing::warn!(
                        fingerprint = %fingerprint.short(),
                        error = %e,
                        "Failed to evict decoded text"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check remaining novels for fingerprint");
            }
        }
    }

    /// 小说已被识别为移走：丢弃它在旧路径上的待删除
    fn release_pending(&self, novel_id: Uuid, path: &Path) {
        let Some(entry) = self.inner.pending.get(path) else {
            return;
        };
        if entry.novel_id != novel_id {
            return;
        }
        if let Some(entry) = self.inner.pending.claim(path, entry.seq) {
            entry.cancel.cancel();
            tracing::debug!(
                novel_id = %novel_id,
                path = %path.display(),
                "Pending deletion of the old path released"
            );
        }
    }

    /// 读取文件，失败时按指数退避重试
    async fn read_file(&self, path: &Path) -> std::io::Result<FileSnapshot> {
        let mut delay = self.inner.config.io_backoff;
        let mut attempt = 0;

        loop {
            match FileSnapshot::read(path).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempt < self.inner.config.io_retries => {
                    attempt += 1;
                    tracing::debug!(
                        path = %path.display(),
                        attempt = attempt,
                        error = %e,
                        "Read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn on_io_failure(
        &self,
        path: &Path,
        err: std::io::Error,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        tracing::warn!(
            path = %path.display(),
            retries = self.inner.config.io_retries,
            error = %err,
            "File unreadable, treating as removed"
        );
        self.mark_deleted(path).await
    }

    /// 在阻塞线程池中解析；解析失败回退为单个合成章节
    async fn parse(
        &self,
        path: &Path,
        format: SourceFormat,
        bytes: Vec<u8>,
    ) -> Result<ParsedDocument, ReconcileError> {
        let parser = self.inner.parser.clone();
        let request = ParseRequest {
            path: path.to_path_buf(),
            format,
            bytes,
        };

        tokio::task::spawn_blocking(move || match parser.parse(&request) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    path = %request.path.display(),
                    format = request.format.as_str(),
                    error = %e,
                    "Parse failed, falling back to a single chapter"
                );
                ParsedDocument::fallback(&request)
            }
        })
        .await
        .map_err(|e| ReconcileError::Task(e.to_string()))
    }

    async fn cache_text(&self, fingerprint: &Fingerprint, parsed: &ParsedDocument) {
        if let Some(text) = &parsed.decoded_text {
            if let Err(e) = self.inner.text_cache.put(fingerprint, text).await {
                tracing::warn!(
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Failed to cache decoded text"
                );
            }
        }
    }

    fn cancel_pending(&self, path: &Path) {
        if let Some(entry) = self.inner.pending.cancel_path(path) {
            tracing::info!(
                novel_id = %entry.novel_id,
                path = %path.display(),
                "File reappeared, pending deletion cancelled"
            );
        }
    }

    fn set_state(&self, path: &Path, state: PathState) {
        self.inner.states.insert(path.to_path_buf(), state);
    }

    fn restore_state(&self, path: &Path, previous: PathState) {
        match previous {
            PathState::Unknown => {
                self.inner.states.remove(path);
            }
            state => self.set_state(path, state),
        }
    }

    fn publish(&self, outcome: &ReconcileOutcome) {
        // 没有订阅者时发送失败，忽略
        let _ = self.inner.outcomes.send(outcome.clone());
    }
}

fn chapter_records(novel_id: Uuid, parsed: &ParsedDocument) -> Vec<ChapterRecord> {
    parsed
        .chapters
        .chapters()
        .iter()
        .map(|chapter| ChapterRecord::from_chapter(novel_id, chapter))
        .collect()
}
