//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod document_parser;
mod file_events;
mod repositories;
mod text_cache;

pub use document_parser::{
    DocumentParserPort, ParseError, ParseRequest, ParsedDocument, WHOLE_TEXT_TITLE,
};
pub use file_events::FileEvent;
pub use repositories::{ChapterRecord, NovelRecord, NovelRepositoryPort, RepositoryError};
pub use text_cache::{CacheError, CacheStats, TextCachePort};
