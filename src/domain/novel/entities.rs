//! Novel Context - Entities

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::NovelError;

/// 章节 - 以字节偏移描述的内容区间
///
/// 不变量:
/// - start <= end，end 不包含
/// - index 在 Novel 内从 0 开始连续
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    index: usize,
    title: String,
    start: usize,
    end: usize,
}

impl Chapter {
    pub fn new(
        index: usize,
        title: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Result<Self, NovelError> {
        if start > end {
            return Err(NovelError::InvalidChapterLayout(format!(
                "chapter {} starts at {} after its end {}",
                index, start, end
            )));
        }
        Ok(Self {
            index,
            title: title.into(),
            start,
            end,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 章节集合
///
/// 不变量（构造时校验）:
/// - 至少一个章节
/// - chapters[0].start == 0
/// - chapters[i].end == chapters[i+1].start
/// - chapters[last].end == content_len
/// - index 为 0..N-1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSet {
    chapters: Vec<Chapter>,
    content_len: usize,
}

impl ChapterSet {
    pub fn new(chapters: Vec<Chapter>, content_len: usize) -> Result<Self, NovelError> {
        let Some(first) = chapters.first() else {
            return Err(NovelError::InvalidChapterLayout(
                "chapter set is empty".to_string(),
            ));
        };
        if first.start != 0 {
            return Err(NovelError::InvalidChapterLayout(format!(
                "first chapter starts at {}",
                first.start
            )));
        }

        for (expected, chapter) in chapters.iter().enumerate() {
            if chapter.index != expected {
                return Err(NovelError::InvalidChapterLayout(format!(
                    "chapter index {} found at position {}",
                    chapter.index, expected
                )));
            }
        }

        for pair in chapters.windows(2) {
            if pair[0].end != pair[1].start {
                return Err(NovelError::InvalidChapterLayout(format!(
                    "gap or overlap between chapter {} (end {}) and {} (start {})",
                    pair[0].index, pair[0].end, pair[1].index, pair[1].start
                )));
            }
        }

        let last_end = chapters.last().map(|c| c.end).unwrap_or(0);
        if last_end != content_len {
            return Err(NovelError::InvalidChapterLayout(format!(
                "last chapter ends at {} but content is {} bytes",
                last_end, content_len
            )));
        }

        Ok(Self {
            chapters,
            content_len,
        })
    }

    /// 单个覆盖全部内容的合成章节
    pub fn single(title: impl Into<String>, content_len: usize) -> Self {
        Self {
            chapters: vec![Chapter {
                index: 0,
                title: title.into(),
                start: 0,
                end: content_len,
            }],
            content_len,
        }
    }

    /// 由有序的 (起始偏移, 标题) 边界构造，结束偏移取下一个边界
    pub fn from_boundaries(
        boundaries: Vec<(usize, String)>,
        content_len: usize,
    ) -> Result<Self, NovelError> {
        let starts: Vec<usize> = boundaries.iter().map(|(start, _)| *start).collect();
        let chapters = boundaries
            .into_iter()
            .enumerate()
            .map(|(index, (start, title))| {
                let end = starts.get(index + 1).copied().unwrap_or(content_len);
                Chapter::new(index, title, start, end)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chapters, content_len)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn into_chapters(self) -> Vec<Chapter> {
        self.chapters
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn content_len(&self) -> usize {
        self.content_len
    }
}
