//! File Events - 规范化后的文件系统事件
//!
//! 监听器产出、协调引擎消费的唯一事件类型。

use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

/// 文件事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileEvent {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Deleted { path: PathBuf },
    /// 监听器能直接给出新旧路径对时使用
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        FileEvent::Created { path: path.into() }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        FileEvent::Modified { path: path.into() }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        FileEvent::Deleted { path: path.into() }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        FileEvent::Renamed {
            from: from.into(),
            to: to.into(),
        }
    }

    /// 事件作用的（目标）路径
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Created { path }
            | FileEvent::Modified { path }
            | FileEvent::Deleted { path } => path,
            FileEvent::Renamed { to, .. } => to,
        }
    }

    /// 事件涉及的所有路径（重命名两端都算）
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FileEvent::Renamed { from, to } => vec![from.as_path(), to.as_path()],
            other => vec![other.path()],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileEvent::Created { .. } => "created",
            FileEvent::Modified { .. } => "modified",
            FileEvent::Deleted { .. } => "deleted",
            FileEvent::Renamed { .. } => "renamed",
        }
    }

    /// 分区号：同一路径的事件总是落在同一分区
    ///
    /// 重命名按源路径分区，与该路径此前的修改/删除保持顺序；
    /// 目标路径上其他分区的事件由引擎的路径锁串行化。
    pub fn partition(&self, partitions: usize) -> usize {
        let key = match self {
            FileEvent::Renamed { from, .. } => from.as_path(),
            other => other.path(),
        };
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % partitions.max(1) as u64) as usize
    }
}

impl std::fmt::Display for FileEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileEvent::Renamed { from, to } => {
                write!(f, "renamed {} -> {}", from.display(), to.display())
            }
            other => write!(f, "{} {}", other.kind(), other.path().display()),
        }
    }
}
