//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod memory;
pub mod persistence;
pub mod watcher;
pub mod worker;

pub use memory::{InMemoryNovelRepository, InMemoryTextCache};
pub use persistence::{SledTextCache, SqliteNovelRepository};
pub use watcher::{FileWatcher, WatchError, WatcherConfig};
pub use worker::{ReconcileWorker, ReconcileWorkerConfig};
