//! 章节识别器
//!
//! 按行扫描原始字节，依次尝试有序的结构规则表。
//! 每个匹配行的行首就是一个章节边界，章节结束于下一个边界（或内容末尾）。
//!
//! 规则表顺序即优先级：同一行被多条规则命中时取排名靠前的那条，
//! 一行最多产生一个边界。

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::encoding::TextEncoding;
use crate::domain::novel::{ChapterSet, NovelError};

/// 首个边界之前存在非空白内容时，序言章节的标题
pub const PREFACE_TITLE: &str = "简介";

/// 超过该字节数的行不可能是标题
const MAX_HEADING_BYTES: usize = 256;

/// 章节结构规则
#[derive(Debug, Clone, Copy)]
pub struct ChapterRule {
    /// 排名，越小越优先
    pub rank: u8,
    pub name: &'static str,
    pub pattern: &'static str,
}

/// 有序规则表
pub const CHAPTER_RULES: &[ChapterRule] = &[
    ChapterRule {
        rank: 0,
        name: "numbered_chapter",
        pattern: r"^第[\d〇零一二两三四五六七八九十百千万壹贰叁肆伍陆柒捌玖拾佰仟]+[章回卷集].{0,30}$",
    },
    ChapterRule {
        rank: 1,
        name: "numbered_section",
        pattern: r"^第[\d〇零一二两三四五六七八九十百千万壹贰叁肆伍陆柒捌玖拾佰仟]+节.{0,30}$",
    },
    ChapterRule {
        rank: 2,
        name: "volume",
        pattern: r"^卷[\d〇零一二两三四五六七八九十百千万壹贰叁肆伍陆柒捌玖拾佰仟]+.{0,30}$",
    },
    ChapterRule {
        rank: 3,
        name: "fixed_marker",
        pattern: r"^[序终尾楔引前后][章言声子记].{0,30}$",
    },
    ChapterRule {
        rank: 4,
        name: "main_or_extra",
        pattern: r"^(?:正文|番外).{0,30}$",
    },
    ChapterRule {
        rank: 5,
        name: "part",
        pattern: r"^[上中下外][部篇卷].{0,30}$",
    },
    ChapterRule {
        rank: 6,
        name: "english_chapter",
        pattern: r"(?i)^(?:chapter|prologue|epilogue|afterword)\b.{0,30}$",
    },
    ChapterRule {
        rank: 7,
        name: "star_marker",
        pattern: r"^[☆★].{0,30}$",
    },
    ChapterRule {
        rank: 8,
        name: "bare_number",
        pattern: r"^\d{1,4}[^\d.：:、&].{0,30}$",
    },
];

static COMPILED_RULES: LazyLock<Vec<(u8, Regex)>> = LazyLock::new(|| {
    let mut compiled: Vec<(u8, Regex)> = CHAPTER_RULES
        .iter()
        .filter_map(|rule| match Regex::new(rule.pattern) {
            Ok(re) => Some((rule.rank, re)),
            Err(e) => {
                tracing::error!(rule = rule.name, error = %e, "Invalid chapter rule skipped");
                None
            }
        })
        .collect();
    compiled.sort_by_key(|(rank, _)| *rank);
    compiled
});

/// 候选边界
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// 匹配行行首的字节偏移
    pub offset: usize,
    /// 去除首尾空白后的行文本
    pub title: String,
    /// 命中规则的排名
    pub rank: u8,
}

/// 返回命中该行的最高优先级规则排名
pub fn match_rule(line: &str) -> Option<u8> {
    COMPILED_RULES
        .iter()
        .find(|(_, re)| re.is_match(line))
        .map(|(rank, _)| *rank)
}

/// 扫描所有候选边界
pub fn find_boundaries(content: &[u8], encoding: TextEncoding) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    let mut offset = 0;

    for line in content.split_inclusive(|b| *b == b'\n') {
        let line_start = offset;
        offset += line.len();

        if line.len() > MAX_HEADING_BYTES {
            continue;
        }

        let decoded = encoding.decode(line);
        let text = decoded.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            continue;
        }

        if let Some(rank) = match_rule(text) {
            boundaries.push(Boundary {
                offset: line_start,
                title: text.to_string(),
                rank,
            });
        }
    }

    boundaries
}

/// 识别章节
///
/// - 无任何边界：单个覆盖全文的章节，标题为 `fallback_title`
/// - 首个边界前只有空白：并入第一章
/// - 首个边界前有正文：单独成为序言章节
pub fn detect_chapters(content: &[u8], fallback_title: &str) -> Result<ChapterSet, NovelError> {
    let encoding = TextEncoding::detect(content)?;
    let boundaries = find_boundaries(content, encoding);

    let Some(first) = boundaries.first() else {
        return Ok(ChapterSet::single(fallback_title, content.len()));
    };

    let mut starts: Vec<(usize, String)> = Vec::with_capacity(boundaries.len() + 1);
    if first.offset > 0 {
        let preamble = encoding.decode(&content[..first.offset]);
        if preamble.trim_start_matches('\u{feff}').trim().is_empty() {
            starts.push((0, first.title.clone()));
        } else {
            starts.push((0, PREFACE_TITLE.to_string()));
            starts.push((first.offset, first.title.clone()));
        }
    } else {
        starts.push((0, first.title.clone()));
    }

    starts.extend(
        boundaries
            .into_iter()
            .skip(1)
            .map(|boundary| (boundary.offset, boundary.title)),
    );

    ChapterSet::from_boundaries(starts, content.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::GB18030;

    fn assert_tiles(set: &ChapterSet, len: usize) {
        let chapters = set.chapters();
        assert_eq!(chapters[0].start(), 0);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
        assert_eq!(chapters.last().unwrap().end(), len);
    }

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(COMPILED_RULES.len(), CHAPTER_RULES.len());
    }

    #[test]
    fn test_two_chapters() {
        let text = "第一章 开始\n...\n第二章 结束\n...";
        let set = detect_chapters(text.as_bytes(), "novel").unwrap();

        let chapters = set.chapters();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title(), "第一章 开始");
        assert_eq!(chapters[1].title(), "第二章 结束");
        assert_eq!(chapters[0].end(), chapters[1].start());
        assert_eq!(chapters[1].start(), "第一章 开始\n...\n".len());
        assert_tiles(&set, text.len());
    }

    #[test]
    fn test_appending_grows_last_chapter() {
        let before = "第一章 开始\n...\n第二章 结束\n...";
        let after = format!("{}\n后来的故事继续展开。\n", before);

        let old = detect_chapters(before.as_bytes(), "novel").unwrap();
        let new = detect_chapters(after.as_bytes(), "novel").unwrap();

        assert_eq!(new.len(), 2);
        assert_eq!(new.chapters()[1].start(), old.chapters()[1].start());
        assert!(new.chapters()[1].end() > old.chapters()[1].end());
        assert_tiles(&new, after.len());
    }

    #[test]
    fn test_no_markers_yields_single_chapter() {
        let text = "只是一段没有任何标题的文字。\n第二行。\n";
        let set = detect_chapters(text.as_bytes(), "散文").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.chapters()[0].title(), "散文");
        assert_eq!(set.chapters()[0].range(), 0..text.len());
    }

    #[test]
    fn test_empty_content() {
        let set = detect_chapters(b"", "空").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.chapters()[0].range(), 0..0);
    }

    #[test]
    fn test_preface_before_first_chapter() {
        let text = "本书简介：一个少年的故事。\n\n第1章 出发\n内容\n";
        let set = detect_chapters(text.as_bytes(), "novel").unwrap();
        let chapters = set.chapters();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title(), PREFACE_TITLE);
        assert_eq!(chapters[1].title(), "第1章 出发");
        assert_tiles(&set, text.len());
    }

    #[test]
    fn test_blank_preamble_folds_into_first_chapter() {
        let text = "\n\u{3000}\n第一章 开始\n内容\n";
        let set = detect_chapters(text.as_bytes(), "novel").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.chapters()[0].title(), "第一章 开始");
        assert_eq!(set.chapters()[0].start(), 0);
    }

    #[test]
    fn test_rank_tie_break() {
        // “第一节”同时满足 numbered_section，不满足 numbered_chapter
        assert_eq!(match_rule("第一节 初见"), Some(1));
        assert_eq!(match_rule("第十二章 风起"), Some(0));
        assert_eq!(match_rule("序章 缘起"), Some(3));
        assert_eq!(match_rule("Chapter 7 The Road"), Some(6));
        assert_eq!(match_rule("Epilogue"), Some(6));
        assert_eq!(match_rule("Chapters of life"), None);
        assert_eq!(match_rule("他走进了第一章的世界里然后一直走啊走啊走到了天涯海角也不愿意停下脚步"), None);
    }

    #[test]
    fn test_mixed_markers() {
        let text = "楔子\n很久以前\n第一章 少年\n内容\n第一节 山门\n内容\n尾声\n结束\n";
        let set = detect_chapters(text.as_bytes(), "novel").unwrap();
        let titles: Vec<&str> = set.chapters().iter().map(|c| c.title()).collect();
        assert_eq!(titles, vec!["楔子", "第一章 少年", "第一节 山门", "尾声"]);
        assert_tiles(&set, text.len());
    }

    #[test]
    fn test_crlf_and_bom() {
        let text = "\u{feff}第一章 开始\r\n内容\r\n第二章 继续\r\n内容\r\n";
        let set = detect_chapters(text.as_bytes(), "novel").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.chapters()[0].title(), "第一章 开始");
        assert_eq!(set.chapters()[1].title(), "第二章 继续");
        assert_tiles(&set, text.len());
    }

    #[test]
    fn test_gb18030_offsets_are_raw_bytes() {
        let (encoded, _, _) = GB18030.encode("第一章 开始\n内容\n第二章 结束\n内容\n");
        let set = detect_chapters(&encoded, "novel").unwrap();
        let chapters = set.chapters();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title(), "第二章 结束");

        let (first_part, _, _) = GB18030.encode("第一章 开始\n内容\n");
        assert_eq!(chapters[1].start(), first_part.len());
        assert_tiles(&set, encoded.len());
    }

    #[test]
    fn test_undecodable_text_is_error() {
        let bytes = [0xFF, 0xFE, 0x00, 0x4E];
        assert!(detect_chapters(&bytes, "novel").is_err());
    }
}
