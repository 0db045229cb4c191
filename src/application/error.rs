//! 应用层错误定义
//!
//! - ApplicationError: 读侧查询错误
//! - ReconcileError: 协调步骤错误（返回给调用协调的一方）

use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::{CacheError, ParseError, RepositoryError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: Uuid,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 缓存错误
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 文件读取错误
    #[error("IO error: {0}")]
    IoError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: Uuid) -> Self {
        Self::NotFound { resource_type, id }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        Self::RepositoryError(err.to_string())
    }
}

impl From<CacheError> for ApplicationError {
    fn from(err: CacheError) -> Self {
        Self::CacheError(err.to_string())
    }
}

impl From<ParseError> for ApplicationError {
    fn from(err: ParseError) -> Self {
        Self::InternalError(err.to_string())
    }
}

/// 协调错误
///
/// 解析失败、读取失败与歧义重命名都在引擎内部消化，不会出现在这里。
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// 存储失败，内存中的监听状态保持不变
    #[error("Storage failure: {0}")]
    Storage(#[from] RepositoryError),

    /// 后台任务异常退出
    #[error("Task failure: {0}")]
    Task(String),
}
