//! Memory Layer - 内存实现
//!
//! 小说仓储与解码文本缓存的内存版本，供 `storage.backend = "memory"` 与测试使用

mod novel_repo;
mod text_cache;

pub use novel_repo::InMemoryNovelRepository;
pub use text_cache::InMemoryTextCache;
