//! Novel Context - 小说限界上下文
//!
//! 职责:
//! - 内容指纹与源文件格式
//! - 章节实体及其铺满（tiling）不变量
//! - 文件名约定解析

mod entities;
mod errors;
mod naming;
mod value_objects;

pub use entities::{Chapter, ChapterSet};
pub use errors::NovelError;
pub use naming::{parse_file_name, BookName, UNTITLED};
pub use value_objects::{Fingerprint, SourceFormat};
