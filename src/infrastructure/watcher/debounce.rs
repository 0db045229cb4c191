//! 按路径的去抖表
//!
//! 同一路径在窗口内的多次通知合并为一个逻辑事件，每次新通知都会把截止时间后推。
//! 表是纯数据结构，时间由调用方传入。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::application::ports::FileEvent;

#[derive(Debug)]
struct Pending {
    event: FileEvent,
    deadline: Instant,
    /// 最近一次更新的顺序号，输出时保持观察顺序
    seq: u64,
}

/// 去抖表，以事件的（目标）路径为键
#[derive(Debug)]
pub struct DebounceTable {
    window: Duration,
    entries: HashMap<PathBuf, Pending>,
    next_seq: u64,
}

impl DebounceTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最早的截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    pub fn push(&mut self, event: FileEvent, now: Instant) {
        match event {
            FileEvent::Created { path } => self.push_created(path, now),
            FileEvent::Modified { path } => self.push_modified(path, now),
            FileEvent::Deleted { path } => self.push_deleted(path, now),
            FileEvent::Renamed { from, to } => self.push_renamed(from, to, now),
        }
    }

    /// 取出已到期的事件，按观察顺序
    pub fn drain_due(&mut self, now: Instant) -> Vec<FileEvent> {
        let due: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut drained: Vec<Pending> = due
            .into_iter()
            .filter_map(|path| self.entries.remove(&path))
            .collect();
        drained.sort_by_key(|p| p.seq);
        drained.into_iter().map(|p| p.event).collect()
    }

    /// 取出全部事件（关闭时冲刷）
    pub fn drain_all(&mut self) -> Vec<FileEvent> {
        let mut drained: Vec<Pending> = self.entries.drain().map(|(_, p)| p).collect();
        drained.sort_by_key(|p| p.seq);
        drained.into_iter().map(|p| p.event).collect()
    }

    fn insert(&mut self, path: PathBuf, event: FileEvent, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            path,
            Pending {
                event,
                deadline: now + self.window,
                seq,
            },
        );
    }

    fn push_created(&mut self, path: PathBuf, now: Instant) {
        let merged = match self.entries.get(&path).map(|p| &p.event) {
            // 原地替换（先删后建）
            Some(FileEvent::Deleted { .. }) | Some(FileEvent::Modified { .. }) => {
                FileEvent::modified(path.clone())
            }
            Some(renamed @ FileEvent::Renamed { .. }) => renamed.clone(),
            Some(FileEvent::Created { .. }) | None => FileEvent::created(path.clone()),
        };
        self.insert(path, merged, now);
    }

    fn push_modified(&mut self, path: PathBuf, now: Instant) {
        let merged = match self.entries.get(&path).map(|p| &p.event) {
            Some(FileEvent::Created { .. }) => FileEvent::created(path.clone()),
            Some(renamed @ FileEvent::Renamed { .. }) => renamed.clone(),
            Some(FileEvent::Modified { .. }) | Some(FileEvent::Deleted { .. }) | None => {
                FileEvent::modified(path.clone())
            }
        };
        self.insert(path, merged, now);
    }

    fn push_deleted(&mut self, path: PathBuf, now: Instant) {
        // 改名后又被删除：源路径上的小说也随之消失
        if let Some(FileEvent::Renamed { from, .. }) = self.entries.get(&path).map(|p| &p.event) {
            let from = from.clone();
            if !self.entries.contains_key(&from) {
                self.insert(from.clone(), FileEvent::deleted(from), now);
            }
        }
        self.insert(path.clone(), FileEvent::deleted(path), now);
    }

    fn push_renamed(&mut self, from: PathBuf, to: PathBuf, now: Instant) {
        // 源路径上尚未发出的事件并入本次改名
        let source = match self.entries.remove(&from).map(|p| p.event) {
            // 窗口内新建的文件被改名：对外只是目标路径上的新建
            Some(FileEvent::Created { .. }) => {
                self.push_created(to, now);
                return;
            }
            // 连续改名
            Some(FileEvent::Renamed { from: origin, .. }) => origin,
            // Modified 由引擎在改名后刷新；Deleted 是平台拆分出的改名前半
            Some(FileEvent::Modified { .. }) | Some(FileEvent::Deleted { .. }) | None => from,
        };

        // 目标路径上被覆盖的改名来源已不存在
        if let Some(FileEvent::Renamed { from: displaced, .. }) =
            self.entries.get(&to).map(|p| &p.event)
        {
            let displaced = displaced.clone();
            if displaced != source && !self.entries.contains_key(&displaced) {
                self.insert(displaced.clone(), FileEvent::deleted(displaced), now);
            }
        }

        if source == to {
            self.push_modified(to, now);
        } else {
            self.insert(to.clone(), FileEvent::renamed(source, to), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn table() -> DebounceTable {
        DebounceTable::new(WINDOW)
    }

    #[test]
    fn test_repeated_writes_coalesce() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::modified("/lib/a.txt"), now);
        table.push(FileEvent::modified("/lib/a.txt"), now + Duration::from_millis(100));
        table.push(FileEvent::modified("/lib/a.txt"), now + Duration::from_millis(200));

        assert_eq!(table.len(), 1);
        // 截止时间随最后一次通知后推
        assert!(table.drain_due(now + WINDOW).is_empty());
        assert_eq!(
            table.drain_due(now + Duration::from_millis(700)),
            vec![FileEvent::modified("/lib/a.txt")]
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_create_then_write_is_create() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::created("/lib/a.txt"), now);
        table.push(FileEvent::modified("/lib/a.txt"), now);

        assert_eq!(table.drain_all(), vec![FileEvent::created("/lib/a.txt")]);
    }

    #[test]
    fn test_delete_then_create_is_modify() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::deleted("/lib/a.txt"), now);
        table.push(FileEvent::created("/lib/a.txt"), now);

        assert_eq!(table.drain_all(), vec![FileEvent::modified("/lib/a.txt")]);
    }

    #[test]
    fn test_write_then_delete_is_delete() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::modified("/lib/a.txt"), now);
        table.push(FileEvent::deleted("/lib/a.txt"), now);

        assert_eq!(table.drain_all(), vec![FileEvent::deleted("/lib/a.txt")]);
    }

    #[test]
    fn test_split_rename_halves_collapse() {
        let mut table = table();
        let now = Instant::now();

        // inotify: From, To, Both
        table.push(FileEvent::deleted("/lib/a.txt"), now);
        table.push(FileEvent::created("/lib/b.txt"), now);
        table.push(FileEvent::renamed("/lib/a.txt", "/lib/b.txt"), now);

        assert_eq!(
            table.drain_all(),
            vec![FileEvent::renamed("/lib/a.txt", "/lib/b.txt")]
        );
    }

    #[test]
    fn test_chained_renames_collapse() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::renamed("/lib/a.txt", "/lib/b.txt"), now);
        table.push(FileEvent::renamed("/lib/b.txt", "/lib/c.txt"), now);
        assert_eq!(
            table.drain_all(),
            vec![FileEvent::renamed("/lib/a.txt", "/lib/c.txt")]
        );

        table.push(FileEvent::renamed("/lib/a.txt", "/lib/b.txt"), now);
        table.push(FileEvent::renamed("/lib/b.txt", "/lib/a.txt"), now);
        assert_eq!(table.drain_all(), vec![FileEvent::modified("/lib/a.txt")]);
    }

    #[test]
    fn test_new_file_renamed_is_create_at_destination() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::created("/lib/tmp.txt"), now);
        table.push(FileEvent::renamed("/lib/tmp.txt", "/lib/a.txt"), now);

        assert_eq!(table.drain_all(), vec![FileEvent::created("/lib/a.txt")]);
    }

    #[test]
    fn test_write_then_rename_keeps_rename() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::modified("/lib/a.txt"), now);
        table.push(FileEvent::renamed("/lib/a.txt", "/lib/b.txt"), now);
        table.push(FileEvent::modified("/lib/b.txt"), now);

        assert_eq!(
            table.drain_all(),
            vec![FileEvent::renamed("/lib/a.txt", "/lib/b.txt")]
        );
    }

    #[test]
    fn test_renamed_then_deleted_deletes_both() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::renamed("/lib/a.txt", "/lib/b.txt"), now);
        table.push(FileEvent::deleted("/lib/b.txt"), now);

        let mut events = table.drain_all();
        events.sort_by(|x, y| x.path().cmp(y.path()));
        assert_eq!(
            events,
            vec![
                FileEvent::deleted("/lib/a.txt"),
                FileEvent::deleted("/lib/b.txt"),
            ]
        );
    }

    #[test]
    fn test_distinct_paths_keep_observation_order() {
        let mut table = table();
        let now = Instant::now();

        table.push(FileEvent::deleted("/lib/z.txt"), now);
        table.push(FileEvent::created("/lib/a.txt"), now);
        table.push(FileEvent::modified("/lib/m.txt"), now + Duration::from_millis(100));

        assert_eq!(
            table.next_deadline(),
            Some(now + WINDOW)
        );
        assert_eq!(
            table.drain_due(now + WINDOW),
            vec![FileEvent::deleted("/lib/z.txt"), FileEvent::created("/lib/a.txt")]
        );
        assert_eq!(table.len(), 1);
    }
}
