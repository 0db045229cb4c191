//! SQLite Novel Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{ChapterRecord, NovelRecord, NovelRepositoryPort, RepositoryError};
use crate::domain::novel::{Fingerprint, SourceFormat};

const NOVEL_COLUMNS: &str = "id, title, author, file_path, format, fingerprint, modified_at, chapter_count, created_at, updated_at, \
     (SELECT c.title FROM chapters c WHERE c.novel_id = novels.id ORDER BY c.chapter_index DESC LIMIT 1) AS last_chapter";

/// SQLite Novel Repository
pub struct SqliteNovelRepository {
    pool: DbPool,
}

impl SqliteNovelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_novels(
        &self,
        filter: &str,
        binds: &[String],
    ) -> Result<Vec<NovelRecord>, RepositoryError> {
        let query = format!("SELECT {} FROM novels {}", NOVEL_COLUMNS, filter);
        let mut sql_query = sqlx::query_as::<_, NovelRow>(&query);
        for value in binds {
            sql_query = sql_query.bind(value);
        }

        let rows: Vec<NovelRow> = sql_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(NovelRecord::try_from).collect()
    }
}

/// LIKE 模式转义（配合 ESCAPE '\'）
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

fn parse_uuid(value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[derive(FromRow)]
struct NovelRow {
    id: String,
    title: String,
    author: Option<String>,
    file_path: String,
    format: String,
    fingerprint: String,
    modified_at: Option<String>,
    chapter_count: i64,
    created_at: String,
    updated_at: String,
    last_chapter: Option<String>,
}

impl TryFrom<NovelRow> for NovelRecord {
    type Error = RepositoryError;

    fn try_from(row: NovelRow) -> Result<Self, Self::Error> {
        Ok(NovelRecord {
            id: parse_uuid(&row.id)?,
            title: row.title,
            author: row.author,
            file_path: PathBuf::from(row.file_path),
            format: SourceFormat::from_str(&row.format).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown format: {}", row.format))
            })?,
            fingerprint: Fingerprint::from_hex(row.fingerprint)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            modified_at: row.modified_at.as_deref().map(parse_time).transpose()?,
            chapter_count: row.chapter_count as usize,
            last_chapter: row.last_chapter,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct ChapterRow {
    id: String,
    novel_id: String,
    chapter_index: i64,
    title: String,
    start_offset: i64,
    end_offset: i64,
}

impl TryFrom<ChapterRow> for ChapterRecord {
    type Error = RepositoryError;

    fn try_from(row: ChapterRow) -> Result<Self, Self::Error> {
        Ok(ChapterRecord {
            id: parse_uuid(&row.id)?,
            novel_id: parse_uuid(&row.novel_id)?,
            index: row.chapter_index as usize,
            title: row.title,
            start_offset: row.start_offset as u64,
            end_offset: row.end_offset as u64,
        })
    }
}

#[async_trait]
impl NovelRepositoryPort for SqliteNovelRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<NovelRecord>, RepositoryError> {
        let mut found = self
            .fetch_novels("WHERE id = ?", &[id.to_string()])
            .await?;
        Ok(found.pop())
    }

    async fn find_by_path(&self, path: &Path) -> Result<Option<NovelRecord>, RepositoryError> {
        let mut found = self
            .fetch_novels("WHERE file_path = ?", &[path_text(path)])
            .await?;
        Ok(found.pop())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<NovelRecord>, RepositoryError> {
        self.fetch_novels(
            "WHERE fingerprint = ? ORDER BY updated_at DESC",
            &[fingerprint.as_str().to_string()],
        )
        .await
    }

    async fn find_all(&self) -> Result<Vec<NovelRecord>, RepositoryError> {
        self.fetch_novels("ORDER BY title", &[]).await
    }

    async fn search(&self, query: &str) -> Result<Vec<NovelRecord>, RepositoryError> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        self.fetch_novels(
            r"WHERE title LIKE ? ESCAPE '\' OR author LIKE ? ESCAPE '\' ORDER BY title",
            &[pattern.clone(), pattern],
        )
        .await
    }

    async fn find_in_folder(
        &self,
        folder: &str,
        query: Option<&str>,
    ) -> Result<Vec<NovelRecord>, RepositoryError> {
        let folder = format!("%/{}/%", escape_like(folder.trim_matches('/')));

        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(keyword) => {
                let pattern = format!("%{}%", escape_like(keyword));
                self.fetch_novels(
                    r"WHERE file_path LIKE ? ESCAPE '\' AND (title LIKE ? ESCAPE '\' OR author LIKE ? ESCAPE '\') ORDER BY file_path",
                    &[folder, pattern.clone(), pattern],
                )
                .await
            }
            None => {
                self.fetch_novels(
                    r"WHERE file_path LIKE ? ESCAPE '\' ORDER BY file_path",
                    &[folder],
                )
                .await
            }
        }
    }

    async fn upsert_novel(&self, novel: &NovelRecord) -> Result<Uuid, RepositoryError> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO novels (id, title, author, file_path, format, fingerprint, modified_at, chapter_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                format = excluded.format,
                modified_at = excluded.modified_at,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(novel.id.to_string())
        .bind(&novel.title)
        .bind(&novel.author)
        .bind(path_text(&novel.file_path))
        .bind(novel.format.as_str())
        .bind(novel.fingerprint.as_str())
        .bind(novel.modified_at.map(|t| t.to_rfc3339()))
        .bind(novel.chapter_count as i64)
        .bind(novel.created_at.to_rfc3339())
        .bind(novel.updated_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        parse_uuid(&id)
    }

    async fn replace_chapters(
        &self,
        novel_id: Uuid,
        fingerprint: &Fingerprint,
        chapters: &[ChapterRecord],
    ) -> Result<(), RepositoryError> {
        // 单个事务内完成：读者要么看到旧章节集，要么看到完整的新章节集
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let updated = sqlx::query(
            "UPDATE novels SET fingerprint = ?, chapter_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(fingerprint.as_str())
        .bind(chapters.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(novel_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("novel {}", novel_id)));
        }

        sqlx::query("DELETE FROM chapters WHERE novel_id = ?")
            .bind(novel_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        // 批量插入，每批 500 条
        const BATCH_SIZE: usize = 500;

        for chunk in chapters.chunks(BATCH_SIZE) {
            let mut query = String::from(
                "INSERT INTO chapters (id, novel_id, chapter_index, title, start_offset, end_offset) VALUES ",
            );
            let placeholders: Vec<&str> = chunk.iter().map(|_| "(?, ?, ?, ?, ?, ?)").collect();
            query.push_str(&placeholders.join(", "));

            let mut sql_query = sqlx::query(&query);
            for chapter in chunk {
                sql_query = sql_query
                    .bind(chapter.id.to_string())
                    .bind(novel_id.to_string())
                    .bind(chapter.index as i64)
                    .bind(&chapter.title)
                    .bind(chapter.start_offset as i64)
                    .bind(chapter.end_offset as i64);
            }

            sql_query
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn rename_path(&self, novel_id: Uuid, new_path: &Path) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE novels SET file_path = ?, updated_at = ? WHERE id = ?")
            .bind(path_text(new_path))
            .bind(Utc::now().to_rfc3339())
            .bind(novel_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("UNIQUE") {
                    RepositoryError::Duplicate(path_text(new_path))
                } else {
                    RepositoryError::DatabaseError(message)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("novel {}", novel_id)));
        }
        Ok(())
    }

    async fn delete_novel(&self, novel_id: Uuid) -> Result<bool, RepositoryError> {
        // 使用事务确保原子性
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        sqlx::query("DELETE FROM chapters WHERE novel_id = ?")
            .bind(novel_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let deleted = sqlx::query("DELETE FROM novels WHERE id = ?")
            .bind(novel_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn find_chapters(&self, novel_id: Uuid) -> Result<Vec<ChapterRecord>, RepositoryError> {
        let rows: Vec<ChapterRow> = sqlx::query_as(
            "SELECT id, novel_id, chapter_index, title, start_offset, end_offset FROM chapters WHERE novel_id = ? ORDER BY chapter_index",
        )
        .bind(novel_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(ChapterRecord::try_from).collect()
    }

    async fn find_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Option<ChapterRecord>, RepositoryError> {
        let row: Option<ChapterRow> = sqlx::query_as(
            "SELECT id, novel_id, chapter_index, title, start_offset, end_offset FROM chapters WHERE id = ?",
        )
        .bind(chapter_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(ChapterRecord::try_from).transpose()
    }
}
