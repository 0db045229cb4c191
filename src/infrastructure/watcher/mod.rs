//! Watcher Layer - 书库目录监听
//!
//! notify 原始事件经规范化、目录展开与去抖后成为协调引擎消费的逻辑文件事件

mod debounce;
mod fs_watcher;
mod normalize;
mod scan;

pub use debounce::DebounceTable;
pub use fs_watcher::{FileWatcher, WatchError, WatcherConfig};
pub use normalize::{is_book, normalize, Notification};
pub use scan::{baseline, diff_snapshot, scan_tree, Baseline, KnownFiles, ScannedFile};
