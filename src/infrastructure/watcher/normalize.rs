//! notify 原始事件 → 规范化通知
//!
//! 只有可识别扩展名（txt / epub）且非隐藏的文件会成为文件事件；
//! 目录事件只用来扩展或收缩监听集合。

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

use crate::application::ports::FileEvent;
use crate::domain::novel::SourceFormat;

/// 规范化后的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    File(FileEvent),
    /// 新出现的目录，可能整体移入了已有文件
    DirCreated(PathBuf),
    /// 消失的路径；若是目录，其下所有已跟踪文件都已不在
    Removed(PathBuf),
    DirRenamed { from: PathBuf, to: PathBuf },
    /// 内核事件队列溢出，需要重新比对整棵树
    Rescan,
}

/// 是否是需要跟踪的书籍文件
pub fn is_book(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden && SourceFormat::from_path(path).is_some()
}

pub fn normalize(event: &Event) -> Vec<Notification> {
    if event.need_rescan() {
        return vec![Notification::Rescan];
    }

    match &event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .filter_map(|path| created(path, *kind))
            .collect(),

        EventKind::Modify(ModifyKind::Name(mode)) => renamed(&event.paths, *mode),

        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),

        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|path| is_book(path))
            .map(|path| Notification::File(FileEvent::modified(path.clone())))
            .collect(),

        EventKind::Remove(kind) => event
            .paths
            .iter()
            .filter_map(|path| removed(path, *kind))
            .collect(),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn created(path: &Path, kind: CreateKind) -> Option<Notification> {
    let is_dir = match kind {
        CreateKind::Folder => true,
        CreateKind::File => false,
        CreateKind::Any | CreateKind::Other => path.is_dir(),
    };

    if is_dir {
        Some(Notification::DirCreated(path.to_path_buf()))
    } else if is_book(path) {
        Some(Notification::File(FileEvent::created(path)))
    } else {
        None
    }
}

fn removed(path: &Path, kind: RemoveKind) -> Option<Notification> {
    match kind {
        RemoveKind::Folder => Some(Notification::Removed(path.to_path_buf())),
        RemoveKind::File => {
            is_book(path).then(|| Notification::File(FileEvent::deleted(path)))
        }
        RemoveKind::Any | RemoveKind::Other => Some(if is_book(path) {
            Notification::File(FileEvent::deleted(path))
        } else {
            Notification::Removed(path.to_path_buf())
        }),
    }
}

fn renamed(paths: &[PathBuf], mode: RenameMode) -> Vec<Notification> {
    match (mode, paths) {
        (RenameMode::Both, [from, to]) => {
            if to.is_dir() {
                return vec![Notification::DirRenamed {
                    from: from.clone(),
                    to: to.clone(),
                }];
            }
            let event = match (is_book(from), is_book(to)) {
                (true, true) => FileEvent::renamed(from.clone(), to.clone()),
                // 改成了无法识别的名字
                (true, false) => FileEvent::deleted(from.clone()),
                // 编辑器先写临时文件再改名覆盖
                (false, true) => FileEvent::created(to.clone()),
                (false, false) => return Vec::new(),
            };
            vec![Notification::File(event)]
        }
        (RenameMode::From, [from]) => vec![if is_book(from) {
            Notification::File(FileEvent::deleted(from.clone()))
        } else {
            Notification::Removed(from.clone())
        }],
        (RenameMode::To, [to]) => created(to, CreateKind::Any).into_iter().collect(),
        // 平台无法给出方向时按路径是否存在判断
        _ => paths
            .iter()
            .filter_map(|path| {
                if path.exists() {
                    created(path, CreateKind::Any)
                } else {
                    removed(path, RemoveKind::Any)
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, Flag, MetadataKind};

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(path.to_path_buf()))
    }

    #[test]
    fn test_is_book() {
        assert!(is_book(Path::new("/lib/a.txt")));
        assert!(is_book(Path::new("/lib/A.EPUB")));
        assert!(!is_book(Path::new("/lib/.a.txt")));
        assert!(!is_book(Path::new("/lib/a.md")));
        assert!(!is_book(Path::new("/lib/a.txt.swp")));
    }

    #[test]
    fn test_file_events() {
        let book = Path::new("/lib/a.txt");

        let create = event(EventKind::Create(CreateKind::File), &[book]);
        assert_eq!(
            normalize(&create),
            vec![Notification::File(FileEvent::created(book))]
        );

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[book],
        );
        assert_eq!(
            normalize(&write),
            vec![Notification::File(FileEvent::modified(book))]
        );

        let remove = event(EventKind::Remove(RemoveKind::File), &[book]);
        assert_eq!(
            normalize(&remove),
            vec![Notification::File(FileEvent::deleted(book))]
        );
    }

    #[test]
    fn test_noise_is_dropped() {
        let book = Path::new("/lib/a.txt");
        let chmod = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &[book],
        );
        assert!(normalize(&chmod).is_empty());

        let other = Path::new("/lib/cover.jpg");
        let create = event(EventKind::Create(CreateKind::File), &[other]);
        assert!(normalize(&create).is_empty());
    }

    #[test]
    fn test_rename_pairs() {
        let from = Path::new("/lib/a.txt");
        let to = Path::new("/lib/b.txt");
        let both = event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &[from, to]);
        assert_eq!(
            normalize(&both),
            vec![Notification::File(FileEvent::renamed(from, to))]
        );

        let tmp = Path::new("/lib/.a.txt.tmp");
        let save = event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &[tmp, from]);
        assert_eq!(
            normalize(&save),
            vec![Notification::File(FileEvent::created(from))]
        );

        let backup = Path::new("/lib/a.txt.bak");
        let retire = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[from, backup],
        );
        assert_eq!(
            normalize(&retire),
            vec![Notification::File(FileEvent::deleted(from))]
        );
    }

    #[test]
    fn test_directory_events() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("卷一");
        std::fs::create_dir(&sub).unwrap();

        let create = event(EventKind::Create(CreateKind::Any), &[&sub]);
        assert_eq!(normalize(&create), vec![Notification::DirCreated(sub.clone())]);

        let gone = Path::new("/lib/旧目录");
        let remove = event(EventKind::Remove(RemoveKind::Any), &[gone]);
        assert_eq!(
            normalize(&remove),
            vec![Notification::Removed(gone.to_path_buf())]
        );

        let moved_away = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &[gone]);
        assert_eq!(
            normalize(&moved_away),
            vec![Notification::Removed(gone.to_path_buf())]
        );
    }

    #[test]
    fn test_overflow_requests_rescan() {
        let overflow = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(normalize(&overflow), vec![Notification::Rescan]);
    }
}
