//! In-Memory Novel Repository Implementation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::ports::{
    ChapterRecord, NovelRecord, NovelRepositoryPort, RepositoryError,
};
use crate::domain::novel::Fingerprint;

#[derive(Default)]
struct State {
    novels: HashMap<Uuid, NovelRecord>,
    /// file_path -> novel_id
    paths: HashMap<PathBuf, Uuid>,
    /// novel_id -> 按 index 排序的章节
    chapters: HashMap<Uuid, Vec<ChapterRecord>>,
}

/// 内存小说仓储
///
/// 单把读写锁覆盖全部表，写操作天然原子。
#[derive(Default)]
pub struct InMemoryNovelRepository {
    state: RwLock<State>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_chapters: AtomicBool,
}

impl InMemoryNovelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 成功提交的写操作次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 开启后所有写操作返回 DatabaseError（模拟存储不可用）
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 开启后只有 `replace_chapters` 失败
    pub fn set_fail_chapters(&self, fail: bool) {
        self.fail_chapters.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::DatabaseError(
                "storage unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn committed(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn sorted_by_title(mut novels: Vec<NovelRecord>) -> Vec<NovelRecord> {
    novels.sort_by(|a, b| a.title.cmp(&b.title));
    novels
}

fn matches_keyword(novel: &NovelRecord, keyword: &str) -> bool {
    novel.title.contains(keyword) || novel.author.as_deref().is_some_and(|a| a.contains(keyword))
}

#[async_trait]
impl NovelRepositoryPort for InMemoryNovelRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<NovelRecord>, RepositoryError> {
        Ok(self.state.read().await.novels.get(&id).cloned())
    }

    async fn find_by_path(&self, path: &Path) -> Result<Option<NovelRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .paths
            .get(path)
            .and_then(|id| state.novels.get(id))
            .cloned())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<NovelRecord>, RepositoryError> {
        let state = self.state.read().await;
        let mut matches: Vec<NovelRecord> = state
            .novels
            .values()
            .filter(|n| &n.fingerprint == fingerprint)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matches)
    }

    async fn find_all(&self) -> Result<Vec<NovelRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(sorted_by_title(state.novels.values().cloned().collect()))
    }

    async fn search(&self, query: &str) -> Result<Vec<NovelRecord>, RepositoryError> {
        let query = query.trim();
        let state = self.state.read().await;
        Ok(sorted_by_title(
            state
                .novels
                .values()
                .filter(|n| matches_keyword(n, query))
                .cloned()
                .collect(),
        ))
    }

    async fn find_in_folder(
        &self,
        folder: &str,
        query: Option<&str>,
    ) -> Result<Vec<NovelRecord>, RepositoryError> {
        let needle = format!("/{}/", folder.trim_matches('/'));
        let keyword = query.map(str::trim).filter(|q| !q.is_empty());
        let state = self.state.read().await;
        let mut matches: Vec<NovelRecord> = state
            .novels
            .values()
            .filter(|n| n.file_path.to_string_lossy().contains(&needle))
            .filter(|n| keyword.map_or(true, |q| matches_keyword(n, q)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(matches)
    }

    async fn upsert_novel(&self, novel: &NovelRecord) -> Result<Uuid, RepositoryError> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let id = match state.paths.get(&novel.file_path).copied() {
            Some(existing_id) => {
                if let Some(existing) = state.novels.get_mut(&existing_id) {
                    existing.title = novel.title.clone();
                    existing.author = novel.author.clone();
                    existing.format = novel.format;
                    existing.modified_at = novel.modified_at;
                    existing.updated_at = novel.updated_at;
                }
                existing_id
            }
            None => {
                state.paths.insert(novel.file_path.clone(), novel.id);
                state.novels.insert(novel.id, novel.clone());
                novel.id
            }
        };

        self.committed();
        Ok(id)
    }

    async fn replace_chapters(
        &self,
        novel_id: Uuid,
        fingerprint: &Fingerprint,
        chapters: &[ChapterRecord],
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        if self.fail_chapters.load(Ordering::SeqCst) {
            return Err(RepositoryError::DatabaseError(
                "chapter table unavailable".to_string(),
            ));
        }
        let mut state = self.state.write().await;

        let novel = state
            .novels
            .get_mut(&novel_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("novel {}", novel_id)))?;
        let mut records = chapters.to_vec();
        records.sort_by_key(|c| c.index);

        novel.fingerprint = fingerprint.clone();
        novel.chapter_count = records.len();
        novel.last_chapter = records.last().map(|c| c.title.clone());
        novel.updated_at = Utc::now();
        state.chapters.insert(novel_id, records);

        self.committed();
        Ok(())
    }

    async fn rename_path(&self, novel_id: Uuid, new_path: &Path) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        if let Some(occupant) = state.paths.get(new_path) {
            if *occupant != novel_id {
                return Err(RepositoryError::Duplicate(new_path.display().to_string()));
            }
        }

        let novel = state
            .novels
            .get_mut(&novel_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("novel {}", novel_id)))?;
        let old_path = std::mem::replace(&mut novel.file_path, new_path.to_path_buf());
        novel.updated_at = Utc::now();

        state.paths.remove(&old_path);
        state.paths.insert(new_path.to_path_buf(), novel_id);

        self.committed();
        Ok(())
    }

    async fn delete_novel(&self, novel_id: Uuid) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        state.chapters.remove(&novel_id);
        let removed = state.novels.remove(&novel_id);
        if let Some(novel) = &removed {
            state.paths.remove(&novel.file_path);
        }

        self.committed();
        Ok(removed.is_some())
    }

    async fn find_chapters(&self, novel_id: Uuid) -> Result<Vec<ChapterRecord>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .chapters
            .get(&novel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Option<ChapterRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .chapters
            .values()
            .flatten()
            .find(|c| c.id == chapter_id)
            .cloned())
    }
}
