//! NovelWatch - 书库目录监听与增量入库
//!
//! 启动流程：加载配置 → 初始化存储 → 基线扫描 → 监听 + 协调，直到 Ctrl-C

use std::sync::Arc;

use novelwatch::application::ports::{NovelRepositoryPort, TextCachePort};
use novelwatch::application::{ReconcileConfig, ReconcileOutcome, Reconciler};
use novelwatch::config::{load_config, print_config, AppConfig, StorageBackend};
use novelwatch::infrastructure::adapters::NovelParser;
use novelwatch::infrastructure::memory::{InMemoryNovelRepository, InMemoryTextCache};
use novelwatch::infrastructure::persistence::sled::{SledCacheConfig, SledTextCache};
use novelwatch::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteNovelRepository,
};
use novelwatch::infrastructure::watcher::{FileWatcher, KnownFiles, WatcherConfig};
use novelwatch::infrastructure::worker::{ReconcileWorker, ReconcileWorkerConfig};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("NovelWatch - 书库目录监听");
    print_config(&config);

    tokio::fs::create_dir_all(&config.library.root).await?;
    let library_root = tokio::fs::canonicalize(&config.library.root).await?;

    let (novel_repo, text_cache) = open_storage(&config).await?;

    // 存储中已有的文件，用于计算停机期间的变化
    let known: KnownFiles = novel_repo
        .find_all()
        .await?
        .into_iter()
        .map(|novel| (novel.file_path, novel.modified_at))
        .collect();

    let reconciler = Reconciler::new(
        novel_repo,
        Arc::new(NovelParser::new()),
        text_cache,
        ReconcileConfig {
            grace_window: config.reconcile.grace_window(),
            io_retries: config.reconcile.io_retries,
            io_backoff: config.reconcile.io_backoff(),
        },
    );

    let shutdown = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(config.watch.queue_capacity);

    tokio::spawn(log_outcomes(reconciler.subscribe(), config.log.json));

    let worker = ReconcileWorker::new(
        ReconcileWorkerConfig {
            workers: config.reconcile.workers,
            ..Default::default()
        },
        event_rx,
        reconciler,
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let watcher_handle = FileWatcher::spawn(
        WatcherConfig {
            root: library_root,
            debounce: config.watch.debounce(),
        },
        known,
        event_tx,
        shutdown.clone(),
    )?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    shutdown.cancel();

    if let Err(e) = watcher_handle.await {
        tracing::error!(error = %e, "File watcher task failed");
    }
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Reconcile worker task failed");
    }

    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},novelwatch={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn NovelRepositoryPort>, Arc<dyn TextCachePort>)> {
    match config.storage.backend {
        StorageBackend::Memory => Ok((
            InMemoryNovelRepository::new().arc(),
            InMemoryTextCache::new().arc(),
        )),
        StorageBackend::Sqlite => {
            // 确保数据目录存在
            for path in [&config.database.path, &config.cache.path] {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }

            let db_config = DatabaseConfig {
                database_url: config.database.database_url(),
                max_connections: config.database.max_connections,
            };
            let pool = create_pool(&db_config).await?;
            run_migrations(&pool).await?;

            let cache_config = SledCacheConfig {
                db_path: config.cache.path.clone(),
                max_size_bytes: config.cache.max_size_bytes,
            };

            Ok((
                Arc::new(SqliteNovelRepository::new(pool)),
                SledTextCache::new(&cache_config)?.arc(),
            ))
        }
    }
}

/// 协调结果流（包括宽限期计时器提交的删除）；JSON 模式下整条结果作为一个字段
///
/// 各状态变化的运维日志由引擎自己输出，Worker 只记录失败。
async fn log_outcomes(mut rx: broadcast::Receiver<ReconcileOutcome>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(outcome) if json => match serde_json::to_string(&outcome) {
                Ok(payload) => tracing::info!(outcome = %payload, "Reconcile outcome"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize outcome"),
            },
            Ok(outcome) => tracing::debug!(outcome = ?outcome, "Reconcile outcome"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Outcome subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
