//! Novel Queries

use uuid::Uuid;

/// 获取小说详情查询
#[derive(Debug, Clone)]
pub struct GetNovel {
    pub novel_id: Uuid,
}

/// 列出小说查询；带关键字时按书名或作者模糊搜索
#[derive(Debug, Clone, Default)]
pub struct ListNovels {
    pub query: Option<String>,
}

/// 列出某个目录下的小说；带关键字时再按书名或作者过滤
#[derive(Debug, Clone)]
pub struct ListFolder {
    /// 目录名（不是完整路径）
    pub folder: String,
    pub query: Option<String>,
}

/// 获取小说的章节列表（按 index 排序）
#[derive(Debug, Clone)]
pub struct GetNovelChapters {
    pub novel_id: Uuid,
}

/// 获取章节正文
#[derive(Debug, Clone)]
pub struct GetChapterContent {
    pub chapter_id: Uuid,
}
