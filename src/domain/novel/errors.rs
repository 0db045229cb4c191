//! Novel Context - Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NovelError {
    #[error("无效的章节布局: {0}")]
    InvalidChapterLayout(String),

    #[error("无效的内容指纹: {0}")]
    InvalidFingerprint(String),

    #[error("无法识别的文本编码: {0}")]
    UndecodableText(String),
}
