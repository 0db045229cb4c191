//! 文件系统监听器
//!
//! notify 回调线程把原始事件送入有界通道；异步循环负责规范化、
//! 目录事件展开、去抖，然后把逻辑事件交给协调队列。

use chrono::{DateTime, Utc};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::debounce::DebounceTable;
use super::normalize::{normalize, Notification};
use super::scan::{baseline, diff_snapshot, scan_tree, KnownFiles, ScannedFile};
use crate::application::ports::FileEvent;

const RAW_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Library root is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub root: PathBuf,
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("library"),
            debounce: Duration::from_millis(500),
        }
    }
}

/// 书库目录监听器
pub struct FileWatcher {
    config: WatcherConfig,
    /// 持有即保持监听
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    table: DebounceTable,
    /// 已发出过事件、当前认为存在的书籍文件
    tracked: KnownFiles,
    sender: mpsc::Sender<FileEvent>,
    shutdown: CancellationToken,
}

impl FileWatcher {
    /// 开始监听并在后台运行
    ///
    /// 先注册监听再做基线扫描，扫描期间发生的变化不会丢失（重复的事件由引擎幂等处理）。
    /// `known` 是存储中已有小说的路径与修改时间。
    pub fn spawn(
        config: WatcherConfig,
        known: KnownFiles,
        sender: mpsc::Sender<FileEvent>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, WatchError> {
        if !config.root.is_dir() {
            return Err(WatchError::InvalidRoot(config.root.clone()));
        }

        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.blocking_send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&config.root, RecursiveMode::Recursive)?;

        tracing::info!(
            root = %config.root.display(),
            debounce_ms = config.debounce.as_millis() as u64,
            "File watcher started"
        );

        let this = Self {
            table: DebounceTable::new(config.debounce),
            config,
            _watcher: watcher,
            raw_rx,
            tracked: KnownFiles::new(),
            sender,
            shutdown,
        };

        Ok(tokio::spawn(this.run(known)))
    }

    async fn run(mut self, known: KnownFiles) {
        if !self.emit_baseline(known).await {
            return;
        }

        let shutdown = self.shutdown.clone();
        loop {
            let deadline = self.table.next_deadline();

            tokio::select! {
                _ = shutdown.cancelled() => break,

                raw = self.raw_rx.recv() => match raw {
                    Some(Ok(event)) => self.on_notify(event).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Watcher error, rescanning");
                        self.rescan().await;
                    }
                    None => {
                        tracing::warn!("Notify channel closed");
                        break;
                    }
                },

                _ = sleep_until_deadline(deadline) => {
                    let due = self.table.drain_due(Instant::now());
                    if !self.emit(due).await {
                        break;
                    }
                }
            }
        }

        let remaining = self.table.drain_all();
        if !remaining.is_empty() {
            tracing::debug!(count = remaining.len(), "Dropping undelivered events on shutdown");
        }

        tracing::info!(root = %self.config.root.display(), "File watcher stopped");
    }

    async fn emit_baseline(&mut self, known: KnownFiles) -> bool {
        let root = self.config.root.clone();
        let result = tokio::task::spawn_blocking(move || baseline(&root, &known)).await;

        match result {
            Ok(baseline) => {
                self.tracked = baseline.files;
                for event in baseline.events {
                    if self.sender.send(event).await.is_err() {
                        tracing::warn!("Reconcile queue closed during baseline");
                        return false;
                    }
                }
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Baseline scan task failed");
                true
            }
        }
    }

    async fn on_notify(&mut self, event: Event) {
        tracing::trace!(kind = ?event.kind, paths = ?event.paths, "Raw notification");
        let now = Instant::now();

        for notification in normalize(&event) {
            match notification {
                Notification::File(file_event) => self.table.push(file_event, now),

                Notification::DirCreated(dir) => {
                    for file in scan_blocking(dir).await {
                        if !self.tracked.contains_key(&file.path) {
                            self.table.push(FileEvent::created(file.path), now);
                        }
                    }
                }

                Notification::Removed(path) => {
                    for tracked in self.tracked_under(&path) {
                        self.table.push(FileEvent::deleted(tracked), now);
                    }
                }

                Notification::DirRenamed { from, to } => {
                    tracing::debug!(from = %from.display(), to = %to.display(), "Directory renamed");
                    for tracked in self.tracked_under(&from) {
                        let Ok(relative) = tracked.strip_prefix(&from) else {
                            continue;
                        };
                        let moved = to.join(relative);
                        self.table.push(FileEvent::renamed(tracked, moved), now);
                    }
                    // 改名期间新出现的文件
                    for file in scan_blocking(to).await {
                        if !self.tracked.contains_key(&file.path) {
                            self.table.push(FileEvent::created(file.path), now);
                        }
                    }
                }

                Notification::Rescan => self.rescan().await,
            }
        }
    }

    /// 与整棵树重新比对
    async fn rescan(&mut self) {
        tracing::warn!(root = %self.config.root.display(), "Rescanning library");
        let now = Instant::now();
        let scanned = scan_blocking(self.config.root.clone()).await;
        for event in diff_snapshot(&self.tracked, &scanned) {
            self.table.push(event, now);
        }
    }

    fn tracked_under(&self, path: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .tracked
            .keys()
            .filter(|tracked| tracked.starts_with(path))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// 发出事件并更新跟踪集合；队列关闭时返回 false
    async fn emit(&mut self, events: Vec<FileEvent>) -> bool {
        for event in events {
            self.track(&event);
            tracing::debug!(event = %event, "File event");
            if self.sender.send(event).await.is_err() {
                tracing::warn!("Reconcile queue closed");
                return false;
            }
        }
        true
    }

    fn track(&mut self, event: &FileEvent) {
        match event {
            FileEvent::Created { path } | FileEvent::Modified { path } => {
                self.tracked.insert(path.clone(), modified_at(path));
            }
            FileEvent::Deleted { path } => {
                self.tracked.remove(path);
            }
            FileEvent::Renamed { from, to } => {
                self.tracked.remove(from);
                self.tracked.insert(to.clone(), modified_at(to));
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn scan_blocking(root: PathBuf) -> Vec<ScannedFile> {
    match tokio::task::spawn_blocking(move || scan_tree(&root)).await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(error = %e, "Scan task failed");
            Vec::new()
        }
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}
