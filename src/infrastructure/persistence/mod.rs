//! Persistence Layer - 数据持久化
//!
//! SQLite（小说/章节）和 Sled（EPUB 解码文本缓存）存储实现

pub mod sled;
pub mod sqlite;

pub use self::sled::SledTextCache;
pub use self::sqlite::SqliteNovelRepository;
