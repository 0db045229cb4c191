//! Sled-based LRU Text Cache Implementation

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{CacheError, CacheStats, TextCachePort};
use crate::domain::novel::Fingerprint;

const KEY_PREFIX: &str = "text:";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/text_cache.sled".to_string(),
            max_size_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

/// 内部缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalCacheEntry {
    text: String,
    size_bytes: u64,
    last_accessed: i64,
    created_at: i64,
}

/// Sled 解码文本缓存
pub struct SledTextCache {
    db: Db,
    max_size_bytes: u64,
    current_size: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SledTextCache {
    /// 创建新的缓存实例
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.db_path)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        let current_size = Self::calculate_total_size(&db)?;

        tracing::info!(
            db_path = %config.db_path,
            max_size_bytes = config.max_size_bytes,
            current_size = current_size,
            "SledTextCache initialized"
        );

        Ok(Self {
            db,
            max_size_bytes: config.max_size_bytes,
            current_size: AtomicU64::new(current_size),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("{}{}", KEY_PREFIX, fingerprint)
    }

    /// 计算数据库中所有条目的总大小
    fn calculate_total_size(db: &Db) -> Result<u64, CacheError> {
        let mut total = 0u64;
        for item in db.scan_prefix(KEY_PREFIX) {
            let (_, value) = item.map_err(|e| CacheError::DatabaseError(e.to_string()))?;
            if let Ok(entry) = bincode::deserialize::<InternalCacheEntry>(&value) {
                total += entry.size_bytes;
            }
        }
        Ok(total)
    }

    /// LRU 淘汰一个条目，缓存为空时返回 false
    fn evict_lru(&self) -> Result<bool, CacheError> {
        let mut oldest: Option<(sled::IVec, InternalCacheEntry)> = None;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(|e| CacheError::DatabaseError(e.to_string()))?;
            if let Ok(entry) = bincode::deserialize::<InternalCacheEntry>(&value) {
                let is_older = oldest
                    .as_ref()
                    .map(|(_, e)| entry.last_accessed < e.last_accessed)
                    .unwrap_or(true);

                if is_older {
                    oldest = Some((key, entry));
                }
            }
        }

        let Some((key, entry)) = oldest else {
            return Ok(false);
        };

        self.db
            .remove(&key)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        self.current_size.fetch_sub(entry.size_bytes, Ordering::Relaxed);

        tracing::debug!(
            key = %String::from_utf8_lossy(&key),
            size_bytes = entry.size_bytes,
            "LRU evicted cache entry"
        );
        Ok(true)
    }
}

#[async_trait]
impl TextCachePort for SledTextCache {
    async fn put(&self, fingerprint: &Fingerprint, text: &str) -> Result<(), CacheError> {
        let size = text.len() as u64;
        if size > self.max_size_bytes {
            tracing::debug!(
                fingerprint = %fingerprint.short(),
                size_bytes = size,
                "Decoded text larger than cache, not cached"
            );
            return Ok(());
        }

        // 同一指纹重复写入时先扣除旧条目
        self.remove(fingerprint).await?;

        // 淘汰以腾出空间
        while self.current_size.load(Ordering::Relaxed) + size > self.max_size_bytes {
            if !self.evict_lru()? {
                break;
            }
        }

        let now = Utc::now().timestamp_millis();
        let entry = InternalCacheEntry {
            text: text.to_string(),
            size_bytes: size,
            last_accessed: now,
            created_at: now,
        };

        let entry_bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        self.db
            .insert(Self::key(fingerprint), entry_bytes)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        self.current_size.fetch_add(size, Ordering::Relaxed);

        tracing::debug!(
            fingerprint = %fingerprint.short(),
            size_bytes = size,
            "Cached decoded text"
        );

        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>, CacheError> {
        let key = Self::key(fingerprint);

        match self.db.get(&key) {
            Ok(Some(data)) => {
                let mut entry: InternalCacheEntry = bincode::deserialize(&data)
                    .map_err(|e| CacheError::SerializationError(e.to_string()))?;

                // 更新访问时间（LRU touch）
                entry.last_accessed = Utc::now().timestamp_millis();
                let entry_bytes = bincode::serialize(&entry)
                    .map_err(|e| CacheError::SerializationError(e.to_string()))?;
                self.db
                    .insert(&key, entry_bytes)
                    .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.text))
            }
            Ok(None) => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => Err(CacheError::DatabaseError(e.to_string())),
        }
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
        if let Some(data) = self
            .db
            .remove(Self::key(fingerprint))
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?
        {
            if let Ok(entry) = bincode::deserialize::<InternalCacheEntry>(&data) {
                self.current_size.fetch_sub(entry.size_bytes, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let total_entries = self.db.scan_prefix(KEY_PREFIX).count();

        CacheStats {
            total_entries,
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
