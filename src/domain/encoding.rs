//! 文本编码识别
//!
//! 先尝试 UTF-8（允许 BOM），失败后回退 GB18030。
//! 解码按字节片进行，偏移始终指向原始字节。

use encoding_rs::GB18030;
use std::borrow::Cow;

use crate::domain::novel::NovelError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 识别出的文本编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Gb18030,
}

impl TextEncoding {
    /// 检测整个文档的编码
    ///
    /// UTF-16 以及 GB18030 下仍有非法序列的内容视为无法解码。
    pub fn detect(bytes: &[u8]) -> Result<Self, NovelError> {
        if std::str::from_utf8(strip_bom(bytes)).is_ok() {
            return Ok(TextEncoding::Utf8);
        }
        if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
            return Err(NovelError::UndecodableText("UTF-16 is not supported".to_string()));
        }
        let (_, had_errors) = GB18030.decode_without_bom_handling(bytes);
        if had_errors {
            return Err(NovelError::UndecodableText(
                "content is neither UTF-8 nor GB18030".to_string(),
            ));
        }
        Ok(TextEncoding::Gb18030)
    }

    /// 解码一段字节（通常是一行或一个章节）
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(strip_bom(bytes)),
            TextEncoding::Gb18030 => GB18030.decode_without_bom_handling(bytes).0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Gb18030 => "gb18030",
        }
    }
}

/// 检测并整体解码
pub fn decode_text(bytes: &[u8]) -> Result<String, NovelError> {
    let encoding = TextEncoding::detect(bytes)?;
    Ok(encoding.decode(bytes).into_owned())
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_utf8_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("第一章".as_bytes());
        assert_eq!(TextEncoding::detect(&bytes).unwrap(), TextEncoding::Utf8);
        assert_eq!(decode_text(&bytes).unwrap(), "第一章");
    }

    #[test]
    fn test_detect_gb18030() {
        let (encoded, _, _) = GB18030.encode("第一章 开始\n正文内容");
        assert!(std::str::from_utf8(&encoded).is_err());
        assert_eq!(TextEncoding::detect(&encoded).unwrap(), TextEncoding::Gb18030);
        assert_eq!(decode_text(&encoded).unwrap(), "第一章 开始\n正文内容");
    }

    #[test]
    fn test_utf16_is_undecodable() {
        let bytes = [0xFF, 0xFE, 0x2C, 0x7B, 0x00, 0x4E];
        assert!(TextEncoding::detect(&bytes).is_err());
    }
}
