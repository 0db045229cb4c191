//! Novel Context - Value Objects

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::NovelError;

/// 内容指纹 - 原始字节的 SHA-256（十六进制小写）
///
/// 指纹变化当且仅当文件字节变化；重命名判定要求指纹完全一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 计算字节内容的指纹
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// 从存储中的十六进制串恢复
    pub fn from_hex(hex: impl Into<String>) -> Result<Self, NovelError> {
        let hex = hex.into();
        let valid = hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(NovelError::InvalidFingerprint(hex));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志用短格式
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 源文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// 纯文本（.txt）
    Text,
    /// EPUB 电子书（.epub）
    Epub,
}

impl SourceFormat {
    /// 根据扩展名识别格式，未识别的扩展名返回 None
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(SourceFormat::Text),
            "epub" => Some(SourceFormat::Epub),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Text => "text",
            SourceFormat::Epub => "epub",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SourceFormat::Text),
            "epub" => Some(SourceFormat::Epub),
            _ => None,
        }
    }

    /// 章节内容是否需要解码缓存（EPUB 偏移指向解码后的文本）
    pub fn needs_decoded_cache(&self) -> bool {
        matches!(self, SourceFormat::Epub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_changes_with_bytes() {
        let a = Fingerprint::of(b"hello");
        let b = Fingerprint::of(b"hello");
        let c = Fingerprint::of(b"hello!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_from_hex() {
        let fp = Fingerprint::of(b"content");
        let restored = Fingerprint::from_hex(fp.as_str()).unwrap();
        assert_eq!(fp, restored);
        assert!(Fingerprint::from_hex("xyz").is_err());
    }

    #[test]
    fn test_source_format_from_path() {
        assert_eq!(SourceFormat::from_path(Path::new("/a/b.txt")), Some(SourceFormat::Text));
        assert_eq!(SourceFormat::from_path(Path::new("/a/B.EPUB")), Some(SourceFormat::Epub));
        assert_eq!(SourceFormat::from_path(Path::new("/a/b.swp")), None);
        assert_eq!(SourceFormat::from_path(Path::new("/a/noext")), None);
    }
}
