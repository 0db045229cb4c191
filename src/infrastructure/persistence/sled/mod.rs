//! Sled Persistence - 嵌入式 KV 缓存

mod text_cache;

pub use text_cache::{SledCacheConfig, SledTextCache};
