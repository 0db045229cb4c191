//! Novel Query Handlers

use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChapterRecord, DocumentParserPort, NovelRecord, NovelRepositoryPort, ParseRequest,
    ParsedDocument, TextCachePort,
};
use crate::application::queries::{
    GetChapterContent, GetNovel, GetNovelChapters, ListFolder, ListNovels,
};
use crate::domain::novel::{Fingerprint, SourceFormat};
use crate::domain::TextEncoding;

// ============================================================================
// Response DTOs
// ============================================================================

/// 小说详情响应
#[derive(Debug, Clone, Serialize)]
pub struct NovelResponse {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub file_path: String,
    pub format: String,
    pub chapter_count: usize,
    /// 最后一章标题，没有章节时为空字符串
    pub last_chapter: String,
    pub modified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<NovelRecord> for NovelResponse {
    fn from(record: NovelRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            author: record.author,
            file_path: record.file_path.to_string_lossy().to_string(),
            format: record.format.as_str().to_string(),
            chapter_count: record.chapter_count,
            last_chapter: record.last_chapter.unwrap_or_default(),
            modified_at: record.modified_at.map(|t| t.to_rfc3339()),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// 章节响应
#[derive(Debug, Clone, Serialize)]
pub struct ChapterResponse {
    pub id: Uuid,
    pub index: usize,
    pub title: String,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl From<ChapterRecord> for ChapterResponse {
    fn from(record: ChapterRecord) -> Self {
        Self {
            id: record.id,
            index: record.index,
            title: record.title,
            start_offset: record.start_offset,
            end_offset: record.end_offset,
        }
    }
}

/// 章节正文响应
#[derive(Debug, Clone, Serialize)]
pub struct ChapterContentResponse {
    pub chapter_id: Uuid,
    pub novel_id: Uuid,
    pub index: usize,
    pub title: String,
    pub content: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GetNovel Handler
pub struct GetNovelHandler {
    novel_repo: Arc<dyn NovelRepositoryPort>,
}

impl GetNovelHandler {
    pub fn new(novel_repo: Arc<dyn NovelRepositoryPort>) -> Self {
        Self { novel_repo }
    }

    pub async fn handle(&self, query: GetNovel) -> Result<NovelResponse, ApplicationError> {
        let novel = self
            .novel_repo
            .find_by_id(query.novel_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Novel", query.novel_id))?;

        Ok(NovelResponse::from(novel))
    }
}

/// ListNovels Handler
pub struct ListNovelsHandler {
    novel_repo: Arc<dyn NovelRepositoryPort>,
}

impl ListNovelsHandler {
    pub fn new(novel_repo: Arc<dyn NovelRepositoryPort>) -> Self {
        Self { novel_repo }
    }

    pub async fn handle(&self, query: ListNovels) -> Result<Vec<NovelResponse>, ApplicationError> {
        let novels = match query.query.as_deref().map(str::trim) {
            Some(keyword) if !keyword.is_empty() => self.novel_repo.search(keyword).await?,
            _ => self.novel_repo.find_all().await?,
        };
        Ok(novels.into_iter().map(NovelResponse::from).collect())
    }
}

/// ListFolder Handler
pub struct ListFolderHandler {
    novel_repo: Arc<dyn NovelRepositoryPort>,
}

impl ListFolderHandler {
    pub fn new(novel_repo: Arc<dyn NovelRepositoryPort>) -> Self {
        Self { novel_repo }
    }

    pub async fn handle(&self, query: ListFolder) -> Result<Vec<NovelResponse>, ApplicationError> {
        if query.folder.trim_matches('/').is_empty() {
            return Err(ApplicationError::validation("folder must not be empty"));
        }
        let novels = self
            .novel_repo
            .find_in_folder(&query.folder, query.query.as_deref())
            .await?;
        Ok(novels.into_iter().map(NovelResponse::from).collect())
    }
}

/// GetNovelChapters Handler
pub struct GetNovelChaptersHandler {
    novel_repo: Arc<dyn NovelRepositoryPort>,
}

impl GetNovelChaptersHandler {
    pub fn new(novel_repo: Arc<dyn NovelRepositoryPort>) -> Self {
        Self { novel_repo }
    }

    pub async fn handle(
        &self,
        query: GetNovelChapters,
    ) -> Result<Vec<ChapterResponse>, ApplicationError> {
        // 验证小说存在
        self.novel_repo
            .find_by_id(query.novel_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Novel", query.novel_id))?;

        let chapters = self.novel_repo.find_chapters(query.novel_id).await?;
        Ok(chapters.into_iter().map(ChapterResponse::from).collect())
    }
}

/// GetChapterContent Handler
///
/// 纯文本按偏移切片原始文件后解码；EPUB 从解码文本缓存切片，
/// 缓存未命中时重新解包并回填缓存。
pub struct GetChapterContentHandler {
    novel_repo: Arc<dyn NovelRepositoryPort>,
    text_cache: Arc<dyn TextCachePort>,
    parser: Arc<dyn DocumentParserPort>,
}

impl GetChapterContentHandler {
    pub fn new(
        novel_repo: Arc<dyn NovelRepositoryPort>,
        text_cache: Arc<dyn TextCachePort>,
        parser: Arc<dyn DocumentParserPort>,
    ) -> Self {
        Self {
            novel_repo,
            text_cache,
            parser,
        }
    }

    pub async fn handle(
        &self,
        query: GetChapterContent,
    ) -> Result<ChapterContentResponse, ApplicationError> {
        let chapter = self
            .novel_repo
            .find_chapter(query.chapter_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Chapter", query.chapter_id))?;

        let novel = self
            .novel_repo
            .find_by_id(chapter.novel_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Novel", chapter.novel_id))?;

        let range = chapter.start_offset as usize..chapter.end_offset as usize;
        let content = match novel.format {
            SourceFormat::Text => self.read_text_chapter(&novel, range).await?,
            SourceFormat::Epub => self.read_epub_chapter(&novel, range).await?,
        };

        Ok(ChapterContentResponse {
            chapter_id: chapter.id,
            novel_id: novel.id,
            index: chapter.index,
            title: chapter.title,
            content,
        })
    }

    async fn read_text_chapter(
        &self,
        novel: &NovelRecord,
        range: Range<usize>,
    ) -> Result<String, ApplicationError> {
        let bytes = self.read_source(novel).await?;
        let slice = bytes
            .get(range)
            .ok_or_else(|| ApplicationError::internal("chapter offsets out of range"))?;

        // 编码按整个文件识别，与建立索引时一致
        let content = match TextEncoding::detect(&bytes) {
            Ok(encoding) => encoding.decode(slice).into_owned(),
            Err(_) => String::from_utf8_lossy(slice).into_owned(),
        };
        Ok(content)
    }

    async fn read_epub_chapter(
        &self,
        novel: &NovelRecord,
        range: Range<usize>,
    ) -> Result<String, ApplicationError> {
        let text = match self.text_cache.get(&novel.fingerprint).await? {
            Some(text) => text,
            None => self.decode_epub(novel).await?,
        };

        text.get(range)
            .map(str::to_string)
            .ok_or_else(|| ApplicationError::internal("chapter offsets out of range"))
    }

    async fn decode_epub(&self, novel: &NovelRecord) -> Result<String, ApplicationError> {
        let bytes = self.read_source(novel).await?;
        let parser = self.parser.clone();
        let request = ParseRequest {
            path: novel.file_path.clone(),
            format: novel.format,
            bytes,
        };

        let parsed = tokio::task::spawn_blocking(move || {
            parser
                .parse(&request)
                .unwrap_or_else(|_| ParsedDocument::fallback(&request))
        })
        .await
        .map_err(|e| ApplicationError::internal(e.to_string()))?;

        let text = parsed.decoded_text.unwrap_or_default();
        if let Err(e) = self.text_cache.put(&novel.fingerprint, &text).await {
            tracing::warn!(novel_id = %novel.id, error = %e, "Failed to cache decoded text");
        }

        tracing::debug!(
            novel_id = %novel.id,
            size_bytes = text.len(),
            "Decoded text cache miss, re-extracted"
        );
        Ok(text)
    }

    /// 读取源文件，并确认内容仍是建立索引时的版本
    async fn read_source(&self, novel: &NovelRecord) -> Result<Vec<u8>, ApplicationError> {
        let bytes = tokio::fs::read(&novel.file_path).await.map_err(|e| {
            ApplicationError::IoError(format!("{}: {}", novel.file_path.display(), e))
        })?;

        if Fingerprint::of(&bytes) != novel.fingerprint {
            return Err(ApplicationError::validation(
                "file changed since it was indexed, reconciliation pending",
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::FileEvent;
    use crate::application::reconcile::{ReconcileConfig, ReconcileOutcome, Reconciler};
    use crate::infrastructure::adapters::parser::sample_epub;
    use crate::infrastructure::adapters::NovelParser;
    use crate::infrastructure::memory::{InMemoryNovelRepository, InMemoryTextCache};
    use encoding_rs::GB18030;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Library {
        repo: Arc<InMemoryNovelRepository>,
        cache: Arc<InMemoryTextCache>,
        engine: Reconciler,
        dir: TempDir,
    }

    impl Library {
        fn new() -> Self {
            let repo = InMemoryNovelRepository::new().arc();
            let cache = InMemoryTextCache::new().arc();
            let engine = Reconciler::new(
                repo.clone(),
                Arc::new(NovelParser::new()),
                cache.clone(),
                ReconcileConfig::default(),
            );
            Self {
                repo,
                cache,
                engine,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        async fn add(&self, relative: &str, content: &[u8]) -> (PathBuf, Uuid) {
            let path = self.dir.path().join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            match self.engine.handle(FileEvent::created(&path)).await.unwrap() {
                ReconcileOutcome::Indexed { novel_id, .. } => (path, novel_id),
                other => panic!("expected Indexed, got {:?}", other),
            }
        }

        fn content_handler(&self, cache: Arc<dyn TextCachePort>) -> GetChapterContentHandler {
            GetChapterContentHandler::new(self.repo.clone(), cache, Arc::new(NovelParser::new()))
        }

        async fn chapters(&self, novel_id: Uuid) -> Vec<ChapterResponse> {
            GetNovelChaptersHandler::new(self.repo.clone())
                .handle(GetNovelChapters { novel_id })
                .await
                .unwrap()
        }
    }

    const TWO_CHAPTERS: &str = "第一章 开始\n少年出发了。\n第二章 结束\n故事结束了。\n";

    #[tokio::test]
    async fn test_list_search_and_folder() {
        let lib = Library::new();
        lib.add("仙侠/仙路 作者：青山.txt", TWO_CHAPTERS.as_bytes()).await;
        lib.add("都市/都市之王.txt", "第一章 回归\n内容\n".as_bytes())
            .await;

        let list = ListNovelsHandler::new(lib.repo.clone());
        assert_eq!(list.handle(ListNovels::default()).await.unwrap().len(), 2);

        let by_author = list
            .handle(ListNovels {
                query: Some("青山".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].title, "仙路");

        let blank = list
            .handle(ListNovels {
                query: Some("  ".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(blank.len(), 2);

        let folder = ListFolderHandler::new(lib.repo.clone())
            .handle(ListFolder {
                folder: "都市".to_string(),
                query: None,
            })
            .await
            .unwrap();
        assert_eq!(folder.len(), 1);
        assert_eq!(folder[0].title, "都市之王");
        assert_eq!(folder[0].last_chapter, "第一章 回归");
    }

    #[tokio::test]
    async fn test_folder_search_by_keyword() {
        let lib = Library::new();
        lib.add("仙侠/仙路 作者：青山.txt", TWO_CHAPTERS.as_bytes()).await;
        lib.add("仙侠/问道.txt", "第一章 入门\n内容\n".as_bytes()).await;
        lib.add("都市/仙路重生.txt", "第一章 重生\n内容\n".as_bytes())
            .await;

        let handler = ListFolderHandler::new(lib.repo.clone());
        let found = handler
            .handle(ListFolder {
                folder: "仙侠".to_string(),
                query: Some("仙路".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "仙路");
        assert_eq!(found[0].author.as_deref(), Some("青山"));
        assert_eq!(found[0].last_chapter, "第二章 结束");

        let by_author = handler
            .handle(ListFolder {
                folder: "仙侠".to_string(),
                query: Some("青山".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);

        let empty_folder = handler
            .handle(ListFolder {
                folder: "/".to_string(),
                query: Some("仙路".to_string()),
            })
            .await;
        assert!(matches!(empty_folder, Err(ApplicationError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_get_missing_novel() {
        let lib = Library::new();
        let id = Uuid::new_v4();

        let result = GetNovelHandler::new(lib.repo.clone())
            .handle(GetNovel { novel_id: id })
            .await;
        assert!(matches!(result, Err(ApplicationError::NotFound { .. })));

        let chapters = GetNovelChaptersHandler::new(lib.repo.clone())
            .handle(GetNovelChapters { novel_id: id })
            .await;
        assert!(matches!(chapters, Err(ApplicationError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_text_chapter_content() {
        let lib = Library::new();
        let (_, novel_id) = lib.add("故事.txt", TWO_CHAPTERS.as_bytes()).await;

        let chapters = lib.chapters(novel_id).await;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].index, 1);

        let content = lib
            .content_handler(lib.cache.clone())
            .handle(GetChapterContent {
                chapter_id: chapters[1].id,
            })
            .await
            .unwrap();
        assert_eq!(content.title, "第二章 结束");
        assert_eq!(content.content, "第二章 结束\n故事结束了。\n");
    }

    #[tokio::test]
    async fn test_gb18030_chapter_content() {
        let lib = Library::new();
        let (encoded, _, _) = GB18030.encode(TWO_CHAPTERS);
        let (_, novel_id) = lib.add("旧书.txt", &encoded).await;

        let chapters = lib.chapters(novel_id).await;
        let content = lib
            .content_handler(lib.cache.clone())
            .handle(GetChapterContent {
                chapter_id: chapters[0].id,
            })
            .await
            .unwrap();
        assert_eq!(content.content, "第一章 开始\n少年出发了。\n");
    }

    #[tokio::test]
    async fn test_epub_content_survives_cache_miss() {
        let lib = Library::new();
        let bytes = sample_epub(None);
        let (_, novel_id) = lib.add("书.epub", &bytes).await;
        let chapters = lib.chapters(novel_id).await;

        let cached = lib
            .content_handler(lib.cache.clone())
            .handle(GetChapterContent {
                chapter_id: chapters[1].id,
            })
            .await
            .unwrap();
        assert!(cached.content.contains("少年离开了山村。"));

        let cold_cache = InMemoryTextCache::new().arc();
        let handler = lib.content_handler(cold_cache.clone());
        let rebuilt = handler
            .handle(GetChapterContent {
                chapter_id: chapters[1].id,
            })
            .await
            .unwrap();
        assert_eq!(rebuilt.content, cached.content);
        assert!(cold_cache
            .get(&Fingerprint::of(&bytes))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_changed_file_is_not_sliced() {
        let lib = Library::new();
        let (path, novel_id) = lib.add("故事.txt", TWO_CHAPTERS.as_bytes()).await;
        let chapters = lib.chapters(novel_id).await;

        std::fs::write(Path::new(&path), "完全不同的内容").unwrap();

        let result = lib
            .content_handler(lib.cache.clone())
            .handle(GetChapterContent {
                chapter_id: chapters[0].id,
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::ValidationError(_))));
    }
}
