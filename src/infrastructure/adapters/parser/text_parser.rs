//! Text Parser - 纯文本章节识别
//!
//! 书名/作者取自文件名，章节由规则表识别，偏移指向原始字节。

use crate::application::ports::{DocumentParserPort, ParseError, ParseRequest, ParsedDocument};
use crate::domain::detect_chapters;
use crate::domain::novel::parse_file_name;

#[derive(Debug, Default, Clone, Copy)]
pub struct TextParser;

impl DocumentParserPort for TextParser {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedDocument, ParseError> {
        let name = parse_file_name(&request.path);
        let chapters = detect_chapters(&request.bytes, &name.title)?;

        Ok(ParsedDocument {
            title: name.title,
            author: name.author,
            chapters,
            decoded_text: None,
        })
    }
}
