//! Document Parsers - 文档解析适配器
//!
//! 按源文件格式分派到纯文本或 EPUB 解析器

mod epub_parser;
mod text_parser;

pub use epub_parser::{
    build_chapters, first_heading, html_to_text, load_package, EpubPackage, EpubParser,
    SpineDocument, TocEntry, FRONT_MATTER_TITLE,
};
pub use text_parser::TextParser;

#[cfg(test)]
pub(crate) use epub_parser::tests::sample_epub;

use std::time::Instant;

use crate::application::ports::{DocumentParserPort, ParseError, ParseRequest, ParsedDocument};
use crate::domain::novel::SourceFormat;

/// 按格式分派的解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct NovelParser {
    text: TextParser,
    epub: EpubParser,
}

impl NovelParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentParserPort for NovelParser {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedDocument, ParseError> {
        let started = Instant::now();
        let result = match request.format {
            SourceFormat::Text => self.text.parse(request),
            SourceFormat::Epub => self.epub.parse(request),
        };

        if let Ok(parsed) = &result {
            tracing::debug!(
                path = %request.path.display(),
                format = request.format.as_str(),
                chapters = parsed.chapters.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Document parsed"
            );
        }
        result
    }
}
