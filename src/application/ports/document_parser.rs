//! Document Parser Port - 文档结构提取
//!
//! 纯同步、CPU 密集的解析接口。调用方负责把它放到阻塞线程池执行。

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::novel::{parse_file_name, ChapterSet, NovelError, SourceFormat};

/// 全文回退章节的标题（EPUB 无任何结构时）
pub const WHOLE_TEXT_TITLE: &str = "全文";

/// 解析错误
///
/// 对引擎来说从不致命：任何解析错误都回退为单个合成章节。
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    #[error("Undecodable text: {0}")]
    UndecodableText(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid chapter layout: {0}")]
    InvalidLayout(String),
}

impl From<NovelError> for ParseError {
    fn from(err: NovelError) -> Self {
        match err {
            NovelError::UndecodableText(msg) => ParseError::UndecodableText(msg),
            other => ParseError::InvalidLayout(other.to_string()),
        }
    }
}

/// 解析请求
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

/// 解析结果
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub title: String,
    pub author: Option<String>,
    pub chapters: ChapterSet,
    /// EPUB 的解码文本（章节偏移指向它）；纯文本为 None，偏移指向原始字节
    pub decoded_text: Option<String>,
}

impl ParsedDocument {
    /// 解析失败时的回退结果：书名取自文件名，单个章节覆盖全部可寻址内容
    pub fn fallback(request: &ParseRequest) -> Self {
        let name = parse_file_name(&request.path);
        match request.format {
            SourceFormat::Text => Self {
                chapters: ChapterSet::single(name.title.clone(), request.bytes.len()),
                title: name.title,
                author: name.author,
                decoded_text: None,
            },
            SourceFormat::Epub => Self {
                chapters: ChapterSet::single(WHOLE_TEXT_TITLE, 0),
                title: name.title,
                author: name.author,
                decoded_text: Some(String::new()),
            },
        }
    }
}

/// Document Parser Port
pub trait DocumentParserPort: Send + Sync {
    /// 提取书名、作者与章节边界
    fn parse(&self, request: &ParseRequest) -> Result<ParsedDocument, ParseError>;
}
