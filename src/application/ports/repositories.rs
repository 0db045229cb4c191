//! Repository Ports - 出站端口
//!
//! 定义小说与章节持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite / 内存）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::novel::{Chapter, Fingerprint, SourceFormat};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// ============================================================================
// Novel Records
// ============================================================================

/// 小说实体（用于持久化）
#[derive(Debug, Clone, PartialEq)]
pub struct NovelRecord {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    /// 绝对路径，在所有小说中唯一
    pub file_path: PathBuf,
    pub format: SourceFormat,
    pub fingerprint: Fingerprint,
    /// 最近一次观察到的文件修改时间
    pub modified_at: Option<DateTime<Utc>>,
    pub chapter_count: usize,
    /// 最后一章的标题
    pub last_chapter: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NovelRecord {
    /// 新观察到的文件，章节尚未写入
    pub fn new(
        file_path: PathBuf,
        format: SourceFormat,
        title: String,
        author: Option<String>,
        fingerprint: Fingerprint,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            author,
            file_path,
            format,
            fingerprint,
            modified_at,
            chapter_count: 0,
            last_chapter: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 章节是否已完整写入且与给定指纹对应
    pub fn is_indexed_as(&self, fingerprint: &Fingerprint) -> bool {
        self.chapter_count > 0 && &self.fingerprint == fingerprint
    }
}

/// 章节实体（用于持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub id: Uuid,
    pub novel_id: Uuid,
    pub index: usize,
    pub title: String,
    pub start_offset: u64,
    /// 不包含
    pub end_offset: u64,
}

impl ChapterRecord {
    pub fn from_chapter(novel_id: Uuid, chapter: &Chapter) -> Self {
        Self {
            id: Uuid::new_v4(),
            novel_id,
            index: chapter.index(),
            title: chapter.title().to_string(),
            start_offset: chapter.start() as u64,
            end_offset: chapter.end() as u64,
        }
    }
}

// ============================================================================
// Novel Repository
// ============================================================================

/// Novel Repository Port
///
/// 写操作的约定：
/// - `upsert_novel` 以 file_path 幂等，冲突时只更新书名/作者/格式/修改时间，
///   不改动 id、指纹、章节数与最后一章标题
/// - `replace_chapters` 原子地整体替换章节，并同时写入指纹与章节数
/// - 重新索引时先替换章节再写入修改时间：章节写入失败则修改时间保持旧值，
///   重启时的基线扫描仍会发现该文件已变化
/// - `delete_novel` 级联删除章节
#[async_trait]
pub trait NovelRepositoryPort: Send + Sync {
    /// 根据 ID 查找小说
    async fn find_by_id(&self, id: Uuid) -> Result<Option<NovelRecord>, RepositoryError>;

    /// 根据文件路径查找小说
    async fn find_by_path(&self, path: &Path) -> Result<Option<NovelRecord>, RepositoryError>;

    /// 查找指纹相同的所有小说（最近更新的在前）
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<NovelRecord>, RepositoryError>;

    /// 获取所有小说
    async fn find_all(&self) -> Result<Vec<NovelRecord>, RepositoryError>;

    /// 按书名或作者模糊搜索
    async fn search(&self, query: &str) -> Result<Vec<NovelRecord>, RepositoryError>;

    /// 查找路径中包含 `/<folder>/` 的小说；带关键字时再按书名或作者过滤
    async fn find_in_folder(
        &self,
        folder: &str,
        query: Option<&str>,
    ) -> Result<Vec<NovelRecord>, RepositoryError>;

    /// 插入或按路径更新小说，返回存储中的 ID
    async fn upsert_novel(&self, novel: &NovelRecord) -> Result<Uuid, RepositoryError>;

    /// 原子地替换全部章节
    async fn replace_chapters(
        &self,
        novel_id: Uuid,
        fingerprint: &Fingerprint,
        chapters: &[ChapterRecord],
    ) -> Result<(), RepositoryError>;

    /// 更新文件路径（章节不变）
    async fn rename_path(&self, novel_id: Uuid, new_path: &Path) -> Result<(), RepositoryError>;

    /// 删除小说及其章节，返回是否确实删除了记录
    async fn delete_novel(&self, novel_id: Uuid) -> Result<bool, RepositoryError>;

    /// 获取小说的所有章节（按 index 排序）
    async fn find_chapters(&self, novel_id: Uuid) -> Result<Vec<ChapterRecord>, RepositoryError>;

    /// 根据 ID 获取章节
    async fn find_chapter(&self, chapter_id: Uuid)
        -> Result<Option<ChapterRecord>, RepositoryError>;
}
