//! NovelWatch - 增量小说入库与书库目录协调
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Novel Context: 小说、章节、内容指纹、文件名解析
//! - 章节识别器与文本编码识别
//!
//! 应用层 (application/):
//! - Ports: 端口定义（NovelRepository, DocumentParser, TextCache, FileEvent）
//! - Reconcile: 协调引擎（指纹比对、删除宽限期、重命名识别）
//! - Queries: CQRS 查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - Watcher: notify 监听、去抖、基线扫描
//! - Worker: ReconcileWorker 按路径分区处理事件
//! - Persistence: SQLite + Sled 存储
//! - Memory: 仓储与缓存的内存实现
//! - Adapters: TXT / EPUB 解析器

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
