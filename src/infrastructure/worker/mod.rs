//! Worker Layer - Background Reconciliation
//!
//! 实现 ReconcileWorker，把文件事件分发给协调引擎

mod reconcile_worker;

pub use reconcile_worker::{ReconcileWorker, ReconcileWorkerConfig};
