//! Domain Layer - 领域层
//!
//! - Novel Context: 小说、章节、指纹
//! - 章节识别器: 有序规则表 + 全文回退
//! - 文本编码识别: UTF-8 / GB18030

pub mod novel;

mod chapter_detector;
mod encoding;

pub use chapter_detector::{
    detect_chapters, find_boundaries, match_rule, Boundary, ChapterRule, CHAPTER_RULES,
    PREFACE_TITLE,
};
pub use encoding::{decode_text, TextEncoding};
