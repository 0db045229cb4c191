//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 书库配置
    #[serde(default)]
    pub library: LibraryConfig,

    /// 监听配置
    #[serde(default)]
    pub watch: WatchConfig,

    /// 协调配置
    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// 存储后端
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 文本缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 书库配置
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// 被监听的书库根目录
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
}

fn default_library_root() -> PathBuf {
    PathBuf::from("library")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
        }
    }
}

/// 监听配置
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// 去抖窗口（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// 监听器到协调 Worker 的队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 协调配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    /// 删除宽限期（毫秒）
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// 并行协调通道数
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// 读取失败重试次数
    #[serde(default = "default_io_retries")]
    pub io_retries: u32,

    /// 首次重试等待（毫秒），之后每次翻倍
    #[serde(default = "default_io_backoff_ms")]
    pub io_backoff_ms: u64,
}

fn default_grace_ms() -> u64 {
    1500 // 三个去抖周期
}

fn default_workers() -> usize {
    4
}

fn default_io_retries() -> u32 {
    3
}

fn default_io_backoff_ms() -> u64 {
    100
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            workers: default_workers(),
            io_retries: default_io_retries(),
            io_backoff_ms: default_io_backoff_ms(),
        }
    }
}

impl ReconcileSettings {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn io_backoff(&self) -> Duration {
        Duration::from_millis(self.io_backoff_ms)
    }
}

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite 存储小说与章节，Sled 缓存解码文本
    #[default]
    Sqlite,
    /// 全部放在内存中，重启后重新索引
    Memory,
}

/// 存储配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/novelwatch.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 解码文本缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Sled 数据目录
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// 最大缓存大小（字节）
    #[serde(default = "default_cache_size")]
    pub max_size_bytes: u64,
}

fn default_cache_path() -> String {
    "data/text_cache.sled".to_string()
}

fn default_cache_size() -> u64 {
    512 * 1024 * 1024 // 512 MB
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_size_bytes: default_cache_size(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
