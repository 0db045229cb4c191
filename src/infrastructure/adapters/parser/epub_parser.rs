//! EPUB Parser - EPUB 结构提取
//!
//! 分两步：
//! 1. `load_package` 用 epub crate 读出元数据、目录（TOC）与书脊（spine）文档
//! 2. `build_chapters` 纯函数：拼接解码文本并按 TOC > spine > 全文 的优先级切分章节
//!
//! 章节偏移指向拼接后的解码文本（UTF-8 字节）。

use epub::doc::{EpubDoc, NavPoint};
use scraper::{Html, Node, Selector};
use std::io::Cursor;
use std::path::Path;

use crate::application::ports::{
    DocumentParserPort, ParseError, ParseRequest, ParsedDocument, WHOLE_TEXT_TITLE,
};
use crate::domain::novel::{parse_file_name, ChapterSet};

/// 首个目录章节之前的内容（封面、版权页等）使用的标题
pub const FRONT_MATTER_TITLE: &str = "正文";

/// 产生换行的块级元素
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "blockquote", "pre", "section", "article", "h1", "h2", "h3",
    "h4", "h5", "h6",
];

/// 书脊中的一个内容文档
#[derive(Debug, Clone)]
pub struct SpineDocument {
    /// 包内路径
    pub path: String,
    pub html: String,
}

/// 展平后的目录项
#[derive(Debug, Clone)]
pub struct TocEntry {
    pub label: String,
    /// 目标文档的包内路径（可带 #fragment）
    pub target: String,
}

/// 从 EPUB 包中读出的、与 epub crate 无关的中间结构
#[derive(Debug, Clone, Default)]
pub struct EpubPackage {
    pub title: Option<String>,
    pub author: Option<String>,
    pub toc: Vec<TocEntry>,
    pub spine: Vec<SpineDocument>,
}

/// 读取 EPUB 包
pub fn load_package(bytes: &[u8]) -> Result<EpubPackage, ParseError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut doc =
        EpubDoc::from_reader(cursor).map_err(|e| ParseError::MalformedPackage(e.to_string()))?;

    let title = doc.mdata("title").map(|m| m.value.clone());
    let author = doc.mdata("creator").map(|m| m.value.clone());

    let mut toc = Vec::new();
    flatten_toc(&doc.toc, &mut toc);

    let mut spine = Vec::new();
    for index in 0..doc.get_num_chapters() {
        doc.set_current_chapter(index);
        let path = doc
            .get_current_path()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let html = match doc.get_current_str() {
            Some((content, _mime)) => content,
            None => String::new(),
        };
        spine.push(SpineDocument { path, html });
    }

    Ok(EpubPackage {
        title,
        author,
        toc,
        spine,
    })
}

/// 深度优先展平目录，子目录跟在父目录之后
fn flatten_toc(points: &[NavPoint], out: &mut Vec<TocEntry>) {
    for point in points {
        out.push(TocEntry {
            label: point.label.trim().to_string(),
            target: point.content.to_string_lossy().to_string(),
        });
        flatten_toc(&point.children, out);
    }
}

/// 拼接解码文本并切分章节
///
/// 优先级：
/// 1. 能解析到书脊文档的目录项，首个目录章节之前的内容成为 `正文` 章节
/// 2. 每个非空书脊文档一章，标题取首个 h1..h6，否则 `第N章`
/// 3. 单个覆盖全文的合成章节
pub fn build_chapters(package: &EpubPackage) -> Result<(String, ChapterSet), ParseError> {
    let mut text = String::new();
    let mut doc_offsets = Vec::with_capacity(package.spine.len());
    let mut has_text = Vec::with_capacity(package.spine.len());

    for doc in &package.spine {
        doc_offsets.push(text.len());
        let body = html_to_text(&doc.html);
        has_text.push(!body.is_empty());
        if !body.is_empty() {
            text.push_str(&body);
            text.push('\n');
        }
    }

    let toc_starts = toc_boundaries(package, &doc_offsets, text.len());
    if !toc_starts.is_empty() {
        let mut starts = Vec::with_capacity(toc_starts.len() + 1);
        if toc_starts[0].0 > 0 {
            starts.push((0, FRONT_MATTER_TITLE.to_string()));
        }
        starts.extend(toc_starts);
        let chapters = ChapterSet::from_boundaries(starts, text.len())?;
        return Ok((text, chapters));
    }

    let spine_starts: Vec<(usize, String)> = package
        .spine
        .iter()
        .enumerate()
        .filter(|(index, _)| has_text[*index])
        .enumerate()
        .map(|(ordinal, (index, doc))| {
            let title =
                first_heading(&doc.html).unwrap_or_else(|| format!("第{}章", ordinal + 1));
            (doc_offsets[index], title)
        })
        .collect();
    if !spine_starts.is_empty() {
        let chapters = ChapterSet::from_boundaries(spine_starts, text.len())?;
        return Ok((text, chapters));
    }

    let chapters = ChapterSet::single(WHOLE_TEXT_TITLE, text.len());
    Ok((text, chapters))
}

/// 目录项 -> (偏移, 标题)
///
/// 无法解析的目录项被丢弃；指向同一文档或回退到更早文档的目录项被合并。
fn toc_boundaries(
    package: &EpubPackage,
    doc_offsets: &[usize],
    text_len: usize,
) -> Vec<(usize, String)> {
    let spine_paths: Vec<String> = package.spine.iter().map(|d| normalize_href(&d.path)).collect();
    let mut starts: Vec<(usize, String)> = Vec::new();

    for entry in &package.toc {
        let Some(index) = resolve_target(&entry.target, &spine_paths) else {
            tracing::debug!(target_path = %entry.target, "TOC entry does not resolve to spine");
            continue;
        };
        let offset = doc_offsets[index];
        if offset >= text_len {
            continue;
        }
        if starts.last().is_some_and(|(last, _)| offset <= *last) {
            continue;
        }
        let label = if entry.label.is_empty() {
            format!("第{}章", starts.len() + 1)
        } else {
            entry.label.clone()
        };
        starts.push((offset, label));
    }

    starts
}

fn resolve_target(target: &str, spine_paths: &[String]) -> Option<usize> {
    let wanted = normalize_href(target);
    if let Some(index) = spine_paths.iter().position(|p| *p == wanted) {
        return Some(index);
    }

    // 路径前缀不一致时退化为按文件名匹配，要求唯一
    let file_name = Path::new(&wanted).file_name()?;
    let mut matches = spine_paths
        .iter()
        .enumerate()
        .filter(|(_, p)| Path::new(p.as_str()).file_name() == Some(file_name));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first.0)
}

/// 去掉 fragment 并按字面消解 `.` 与 `..`
fn normalize_href(href: &str) -> String {
    let without_fragment = href.split('#').next().unwrap_or_default();
    let mut parts: Vec<&str> = Vec::new();
    for part in without_fragment.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// XHTML -> 纯文本
///
/// 去掉 script/style，块级元素断行，每行去首尾空白，丢弃空行。
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = match Selector::parse("body") {
        Ok(selector) => document.select(&selector).next(),
        Err(_) => None,
    };
    let root = body.unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    for node in root.descendants() {
        match node.value() {
            Node::Text(text) => {
                let skipped = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| matches!(e.name(), "script" | "style" | "head"))
                });
                if !skipped {
                    raw.push_str(text);
                }
            }
            Node::Element(element) if BLOCK_TAGS.contains(&element.name()) => raw.push('\n'),
            _ => {}
        }
    }

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 首个 h1..h6 的文本
pub fn first_heading(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6").ok()?;
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|s| !s.is_empty())
}

/// EPUB 解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubParser;

impl DocumentParserPort for EpubParser {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedDocument, ParseError> {
        let package = load_package(&request.bytes)?;
        let (text, chapters) = build_chapters(&package)?;

        let name = parse_file_name(&request.path);
        let title = package
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(name.title);
        let author = package
            .author
            .filter(|a| !a.trim().is_empty())
            .or(name.author);

        tracing::debug!(
            path = %request.path.display(),
            toc_entries = package.toc.len(),
            spine_items = package.spine.len(),
            chapters = chapters.len(),
            "EPUB structure extracted"
        );

        Ok(ParsedDocument {
            title,
            author,
            chapters,
            decoded_text: Some(text),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::novel::SourceFormat;
    use std::path::PathBuf;

    fn doc(path: &str, body: &str) -> SpineDocument {
        SpineDocument {
            path: path.to_string(),
            html: format!("<html><head><title>t</title></head><body>{}</body></html>", body),
        }
    }

    fn toc(label: &str, target: &str) -> TocEntry {
        TocEntry {
            label: label.to_string(),
            target: target.to_string(),
        }
    }

    fn titles(set: &ChapterSet) -> Vec<&str> {
        set.chapters().iter().map(|c| c.title()).collect()
    }

    #[test]
    fn test_html_to_text_cleans_markup() {
        let html = "<html><head><style>p{}</style></head><body>\
            <h1>第一章</h1><p>  第一段 <b>加粗</b> </p><script>var x=1;</script>\
            <p></p><p>第二段<br/>换行</p></body></html>";
        assert_eq!(html_to_text(html), "第一章\n第一段 加粗\n第二段\n换行");
    }

    #[test]
    fn test_first_heading() {
        assert_eq!(
            first_heading("<body><p>x</p><h2> 标题 </h2></body>").as_deref(),
            Some("标题")
        );
        assert_eq!(first_heading("<body><p>x</p></body>"), None);
    }

    #[test]
    fn test_toc_wins_over_spine() {
        let package = EpubPackage {
            toc: vec![toc("第一章", "OEBPS/c1.xhtml"), toc("第二章", "OEBPS/c3.xhtml#top")],
            spine: vec![
                doc("OEBPS/c1.xhtml", "<p>一</p>"),
                doc("OEBPS/c2.xhtml", "<p>一续</p>"),
                doc("OEBPS/c3.xhtml", "<p>二</p>"),
            ],
            ..Default::default()
        };

        let (text, set) = build_chapters(&package).unwrap();
        assert_eq!(titles(&set), vec!["第一章", "第二章"]);
        assert_eq!(text, "一\n一续\n二\n");
        assert_eq!(&text[set.chapters()[1].range()], "二\n");
        assert_eq!(set.chapters()[1].end(), text.len());
    }

    #[test]
    fn test_front_matter_becomes_leading_chapter() {
        let package = EpubPackage {
            toc: vec![toc("Chapter 1", "Text/ch1.xhtml")],
            spine: vec![
                doc("OEBPS/Text/cover.xhtml", "<p>封面</p>"),
                doc("OEBPS/Text/ch1.xhtml", "<p>故事</p>"),
            ],
            ..Default::default()
        };

        let (text, set) = build_chapters(&package).unwrap();
        assert_eq!(titles(&set), vec![FRONT_MATTER_TITLE, "Chapter 1"]);
        assert_eq!(&text[set.chapters()[0].range()], "封面\n");
    }

    #[test]
    fn test_spine_only() {
        let package = EpubPackage {
            spine: vec![
                doc("a.xhtml", "<h1>开端</h1><p>内容</p>"),
                doc("b.xhtml", ""),
                doc("c.xhtml", "<p>没有标题</p>"),
            ],
            ..Default::default()
        };

        let (text, set) = build_chapters(&package).unwrap();
        assert_eq!(titles(&set), vec!["开端", "第2章"]);
        assert_eq!(set.chapters()[1].end(), text.len());
    }

    #[test]
    fn test_unresolvable_toc_falls_back_to_spine() {
        let package = EpubPackage {
            toc: vec![toc("丢失", "missing.xhtml")],
            spine: vec![doc("a.xhtml", "<p>甲</p>"), doc("b.xhtml", "<p>乙</p>")],
            ..Default::default()
        };

        let (_, set) = build_chapters(&package).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_neither_toc_nor_spine() {
        let (text, set) = build_chapters(&EpubPackage::default()).unwrap();
        assert_eq!(text, "");
        assert_eq!(titles(&set), vec![WHOLE_TEXT_TITLE]);
    }

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("OEBPS/Text/../c1.xhtml#s1"), "OEBPS/c1.xhtml");
        assert_eq!(normalize_href("./c1.xhtml"), "c1.xhtml");
    }

    #[test]
    fn test_malformed_package() {
        let request = ParseRequest {
            path: PathBuf::from("/lib/broken.epub"),
            format: SourceFormat::Epub,
            bytes: b"This is not an EPUB".to_vec(),
        };
        assert!(matches!(
            EpubParser.parse(&request),
            Err(ParseError::MalformedPackage(_))
        ));
    }

    /// 构造一个未压缩（stored）的 ZIP 包
    pub(crate) fn stored_zip(files: &[(&str, &str)]) -> Vec<u8> {
        const DOS_DATE: u16 = (40 << 9) | (1 << 5) | 1;
        let mut out = Vec::new();
        let mut central = Vec::new();

        for (name, content) in files {
            let offset = out.len() as u32;
            let data = content.as_bytes();
            let crc = crc32fast::hash(data);

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&DOS_DATE.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&DOS_DATE.to_le_bytes());
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u32.to_le_bytes());
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    /// 两个书脊文档、一条目录的最小 EPUB 2
    pub(crate) fn sample_epub(creator: Option<&str>) -> Vec<u8> {
        let creator = creator
            .map(|c| format!("<dc:creator>{}</dc:creator>", c))
            .unwrap_or_default();
        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>测试之书</dc:title>
    {}
    <dc:identifier id="bookid">urn:uuid:test-book</dc:identifier>
    <dc:language>zh</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="cover"/>
    <itemref idref="c1"/>
  </spine>
</package>"#,
            creator
        );
        let ncx = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:test-book"/></head>
  <docTitle><text>测试之书</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>第一章 启程</text></navLabel>
      <content src="c1.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;
        let container = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        let cover = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>封面</title></head><body><p>版权所有</p></body></html>"#;
        let c1 = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>c1</title></head><body><h1>第一章 启程</h1><p>少年离开了山村。</p></body></html>"#;

        stored_zip(&[
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", container),
            ("OEBPS/content.opf", &opf),
            ("OEBPS/toc.ncx", ncx),
            ("OEBPS/cover.xhtml", cover),
            ("OEBPS/c1.xhtml", c1),
        ])
    }

    #[test]
    fn test_parse_real_package() {
        let request = ParseRequest {
            path: PathBuf::from("/lib/某书 作者：文件名作者.epub"),
            format: SourceFormat::Epub,
            bytes: sample_epub(Some("元数据作者")),
        };

        let parsed = EpubParser.parse(&request).unwrap();
        assert_eq!(parsed.title, "测试之书");
        assert_eq!(parsed.author.as_deref(), Some("元数据作者"));
        assert_eq!(titles(&parsed.chapters), vec![FRONT_MATTER_TITLE, "第一章 启程"]);

        let text = parsed.decoded_text.unwrap();
        assert_eq!(&text[parsed.chapters.chapters()[0].range()], "版权所有\n");
        assert!(text[parsed.chapters.chapters()[1].range()].contains("少年离开了山村。"));
    }

    #[test]
    fn test_author_from_file_name_when_metadata_missing() {
        let request = ParseRequest {
            path: PathBuf::from("/lib/某书 作者：文件名作者.epub"),
            format: SourceFormat::Epub,
            bytes: sample_epub(None),
        };

        let parsed = EpubParser.parse(&request).unwrap();
        assert_eq!(parsed.title, "测试之书");
        assert_eq!(parsed.author.as_deref(), Some("文件名作者"));
    }
}
