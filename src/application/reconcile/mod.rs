//! Reconcile - 文件系统与存储的协调
//!
//! 每个文件路径一台状态机：`Unknown → Tracked → (Stale | Removed)`，
//! 重新解析成功后回到 `Tracked`。
//!
//! - engine: 事件处理、重命名识别、删除宽限期
//! - pending_deletes: 宽限期内待提交的删除
//! - locks: 按小说 ID 与按路径的变更锁

mod engine;
mod locks;
mod pending_deletes;

pub use engine::{PathState, ReconcileConfig, ReconcileOutcome, Reconciler};
pub use locks::{KeyedLocks, NovelLocks, PathLocks};
pub use pending_deletes::{PendingDelete, PendingDeletes};
