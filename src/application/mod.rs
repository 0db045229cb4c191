//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Repository、DocumentParser、TextCache、FileEvent）
//! - reconcile: 文件事件到存储的协调引擎
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod error;
pub mod ports;
pub mod queries;
pub mod reconcile;

pub use error::{ApplicationError, ReconcileError};

pub use ports::{
    // Storage
    ChapterRecord,
    NovelRecord,
    NovelRepositoryPort,
    RepositoryError,
    // Parsing
    DocumentParserPort,
    ParseError,
    ParseRequest,
    ParsedDocument,
    // Decoded text cache
    CacheError,
    CacheStats,
    TextCachePort,
    // Events
    FileEvent,
};

pub use queries::{
    GetChapterContent,
    GetNovel,
    GetNovelChapters,
    ListFolder,
    ListNovels,
    // Handlers
    handlers::{
        ChapterContentResponse, ChapterResponse, GetChapterContentHandler, GetNovelChaptersHandler,
        GetNovelHandler, ListFolderHandler, ListNovelsHandler, NovelResponse,
    },
};

pub use reconcile::{PathState, ReconcileConfig, ReconcileOutcome, Reconciler};
