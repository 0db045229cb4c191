//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, StorageBackend};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `NOVELWATCH_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `NOVELWATCH_LIBRARY__ROOT=/srv/novels`
/// - `NOVELWATCH_WATCH__DEBOUNCE_MS=250`
/// - `NOVELWATCH_RECONCILE__GRACE_MS=3000`
/// - `NOVELWATCH_STORAGE__BACKEND=memory`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("library.root", "library")?
        .set_default("watch.debounce_ms", 500)?
        .set_default("watch.queue_capacity", 1024)?
        .set_default("reconcile.grace_ms", 1500)?
        .set_default("reconcile.workers", 4)?
        .set_default("reconcile.io_retries", 3)?
        .set_default("reconcile.io_backoff_ms", 100)?
        .set_default("storage.backend", "sqlite")?
        .set_default("database.path", "data/novelwatch.db")?
        .set_default("database.max_connections", 5)?
        .set_default("cache.path", "data/text_cache.sled")?
        .set_default("cache.max_size_bytes", 512_u64 * 1024 * 1024)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("NOVELWATCH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.library.root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Library root cannot be empty".to_string(),
        ));
    }

    if config.watch.debounce_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Debounce window cannot be 0".to_string(),
        ));
    }

    // 宽限期短于去抖窗口时，拆分的改名事件来不及配对
    if config.reconcile.grace_ms < config.watch.debounce_ms {
        return Err(ConfigError::ValidationError(format!(
            "Grace window ({}ms) must not be shorter than the debounce window ({}ms)",
            config.reconcile.grace_ms, config.watch.debounce_ms
        )));
    }

    if config.reconcile.workers == 0 {
        return Err(ConfigError::ValidationError(
            "Reconcile workers cannot be 0".to_string(),
        ));
    }

    if config.watch.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "Queue capacity cannot be 0".to_string(),
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite {
        if config.database.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "Database path cannot be empty".to_string(),
            ));
        }
        if config.cache.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "Cache path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Library Root: {:?}", config.library.root);
    tracing::info!("Debounce: {}ms", config.watch.debounce_ms);
    tracing::info!("Grace Window: {}ms", config.reconcile.grace_ms);
    tracing::info!("Reconcile Workers: {}", config.reconcile.workers);
    tracing::info!("Storage Backend: {:?}", config.storage.backend);
    if config.storage.backend == StorageBackend::Sqlite {
        tracing::info!("Database: {}", config.database.path);
        tracing::info!("Database Max Connections: {}", config.database.max_connections);
        tracing::info!("Text Cache: {}", config.cache.path);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_debounce() {
        let mut config = AppConfig::default();
        config.watch.debounce_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_short_grace_window() {
        let mut config = AppConfig::default();
        config.reconcile.grace_ms = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_memory_backend_skips_database_checks() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.database.path = String::new();
        assert!(validate_config(&config).is_ok());

        config.storage.backend = StorageBackend::Sqlite;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novelwatch.toml");
        std::fs::write(
            &path,
            r#"
[library]
root = "/srv/novels"

[reconcile]
grace_ms = 3000

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.library.root, PathBuf::from("/srv/novels"));
        assert_eq!(config.reconcile.grace_ms, 3000);
        assert_eq!(config.reconcile.workers, 4);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }
}
