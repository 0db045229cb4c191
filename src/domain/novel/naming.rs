//! 文件名约定解析
//!
//! `<书名> 作者：<作者>.txt` 形式的文件名可以直接给出书名与作者。

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// 无法从文件名得到任何内容时使用的书名
pub const UNTITLED: &str = "未命名";

static AUTHOR_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*作者\s*[：:]\s*(.+)$").ok());

/// 从文件名解析出的书目信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookName {
    pub title: String,
    pub author: Option<String>,
}

/// 解析文件名（不含扩展名）
///
/// 作者部分缺失或格式不对时只返回书名，从不失败。
pub fn parse_file_name(path: &Path) -> BookName {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default();

    if let Some(caps) = AUTHOR_SUFFIX.as_ref().and_then(|re| re.captures(&stem)) {
        let title = clean_title(&caps[1]);
        let author = caps[2].trim().to_string();
        if !title.is_empty() && !author.is_empty() {
            return BookName {
                title,
                author: Some(author),
            };
        }
    }

    let title = clean_title(&stem);
    BookName {
        title: if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title
        },
        author: None,
    }
}

fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches(['《', '》']).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_author() {
        let name = parse_file_name(Path::new("/lib/斗破苍穹 作者：天蚕土豆.txt"));
        assert_eq!(name.title, "斗破苍穹");
        assert_eq!(name.author.as_deref(), Some("天蚕土豆"));
    }

    #[test]
    fn test_ascii_colon_and_brackets() {
        let name = parse_file_name(Path::new("《雪中悍刀行》作者:烽火戏诸侯.epub"));
        assert_eq!(name.title, "雪中悍刀行");
        assert_eq!(name.author.as_deref(), Some("烽火戏诸侯"));
    }

    #[test]
    fn test_plain_stem() {
        let name = parse_file_name(Path::new("/lib/novel.txt"));
        assert_eq!(name.title, "novel");
        assert_eq!(name.author, None);
    }

    #[test]
    fn test_malformed_author_falls_back() {
        let name = parse_file_name(Path::new("作者：某人.txt"));
        assert_eq!(name.title, "作者：某人");
        assert_eq!(name.author, None);
    }
}
