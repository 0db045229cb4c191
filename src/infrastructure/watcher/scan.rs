//! 目录树扫描与基线比对
//!
//! 启动时把磁盘与存储中的已知文件比对，补齐停机期间错过的变化；
//! 事件队列溢出时也用同样的方式重新收敛。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::normalize::is_book;
use crate::application::ports::FileEvent;

/// 已知文件：路径 → 最近观察到的修改时间
pub type KnownFiles = HashMap<PathBuf, Option<DateTime<Utc>>>;

/// 扫描到的书籍文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub modified_at: Option<DateTime<Utc>>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// 递归扫描目录下的所有书籍文件（跳过隐藏文件与隐藏目录）
pub fn scan_tree(root: &Path) -> Vec<ScannedFile> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() || !is_book(entry.path()) {
                    continue;
                }
                let modified_at = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from);
                files.push(ScannedFile {
                    path: entry.into_path(),
                    modified_at,
                });
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Error walking directory");
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// 比对已知文件与扫描结果
///
/// 先输出消失文件的 Deleted（便于引擎把随后的 Created 识别为重命名），
/// 再输出新文件的 Created 与修改时间变化文件的 Modified。
pub fn diff_snapshot(known: &KnownFiles, scanned: &[ScannedFile]) -> Vec<FileEvent> {
    let present: HashMap<&Path, Option<DateTime<Utc>>> = scanned
        .iter()
        .map(|f| (f.path.as_path(), f.modified_at))
        .collect();

    let mut deleted: Vec<&PathBuf> = known
        .keys()
        .filter(|path| !present.contains_key(path.as_path()))
        .collect();
    deleted.sort();

    let mut events: Vec<FileEvent> = deleted
        .into_iter()
        .map(|path| FileEvent::deleted(path.clone()))
        .collect();

    for file in scanned {
        match known.get(&file.path) {
            None => events.push(FileEvent::created(file.path.clone())),
            Some(known_mtime) if *known_mtime != file.modified_at || known_mtime.is_none() => {
                events.push(FileEvent::modified(file.path.clone()))
            }
            Some(_) => {}
        }
    }

    events
}

/// 启动基线
#[derive(Debug, Default)]
pub struct Baseline {
    /// 需要协调的事件
    pub events: Vec<FileEvent>,
    /// 磁盘上现有的书籍文件，作为监听器的跟踪集合
    pub files: KnownFiles,
}

/// 启动基线：只比对位于 root 之下的已知文件
pub fn baseline(root: &Path, known: &KnownFiles) -> Baseline {
    let scoped: KnownFiles = known
        .iter()
        .filter(|(path, _)| path.starts_with(root))
        .map(|(path, mtime)| (path.clone(), *mtime))
        .collect();

    let scanned = scan_tree(root);
    let events = diff_snapshot(&scoped, &scanned);

    tracing::info!(
        root = %root.display(),
        known = scoped.len(),
        scanned = scanned.len(),
        events = events.len(),
        "Baseline scan completed"
    );

    Baseline {
        events,
        files: scanned
            .into_iter()
            .map(|f| (f.path, f.modified_at))
            .collect(),
    }
}
