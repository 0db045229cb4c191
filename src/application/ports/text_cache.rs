//! Text Cache Port - 解码文本缓存
//!
//! EPUB 章节偏移指向解码后的文本，按内容指纹缓存该文本，
//! 读取章节内容时直接切片，无需重新解包。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::novel::Fingerprint;

/// Text Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Text Cache Port
///
/// 以指纹为 key 的 LRU 缓存，超出容量时淘汰最久未访问的条目
#[async_trait]
pub trait TextCachePort: Send + Sync {
    /// 存储解码文本
    async fn put(&self, fingerprint: &Fingerprint, text: &str) -> Result<(), CacheError>;

    /// 获取解码文本，同时刷新访问时间
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>, CacheError>;

    /// 删除缓存条目
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), CacheError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}
