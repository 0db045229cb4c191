//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：小说列表、搜索、章节列表与章节内容

mod novel_queries;

pub mod handlers;

pub use novel_queries::*;
