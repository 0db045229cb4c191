//! In-Memory Text Cache Implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{CacheError, CacheStats, TextCachePort};
use crate::domain::novel::Fingerprint;

/// 内存解码文本缓存（不做淘汰）
#[derive(Default)]
pub struct InMemoryTextCache {
    entries: DashMap<Fingerprint, String>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl InMemoryTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl TextCachePort for InMemoryTextCache {
    async fn put(&self, fingerprint: &Fingerprint, text: &str) -> Result<(), CacheError> {
        self.entries.insert(fingerprint.clone(), text.to_string());
        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>, CacheError> {
        match self.entries.get(fingerprint) {
            Some(text) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(text.clone()))
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
        self.entries.remove(fingerprint);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            total_size_bytes: self.entries.iter().map(|e| e.value().len() as u64).sum(),
            max_size_bytes: 0,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
