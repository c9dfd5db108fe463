//! Document partitioning: file on disk → ordered, typed [`Element`]s.
//!
//! PDFs are read with `pdf-extract`; plain text is read as (lossy) UTF-8.
//! Text is split into blocks on blank lines and each block is classified
//! as a title, a list item, or narrative text. Titles matter downstream:
//! the chunk aggregator starts a new section at every title.
//!
//! With [`PartitionStrategy::HiRes`] PDFs are extracted page by page and
//! every element carries its page number. [`PartitionStrategy::Fast`]
//! extracts the whole document in one pass and skips classification.

use std::path::Path;

use crate::config::PartitionStrategy;
use crate::error::PartitionError;
use crate::models::{Element, ElementKind};

/// Longest single line still considered a heading.
const TITLE_MAX_CHARS: usize = 80;
const TITLE_MAX_WORDS: usize = 12;

/// Converts a file into elements. Implementations are blocking and are
/// driven from `spawn_blocking` by the ingestion worker.
pub trait Partitioner: Send + Sync {
    fn partition(&self, path: &Path, filename: &str) -> Result<Vec<Element>, PartitionError>;
}

/// The built-in partitioner for `.pdf` and `.txt` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentPartitioner {
    strategy: PartitionStrategy,
}

impl DocumentPartitioner {
    pub fn new(strategy: PartitionStrategy) -> Self {
        Self { strategy }
    }
}

impl Partitioner for DocumentPartitioner {
    fn partition(&self, path: &Path, filename: &str) -> Result<Vec<Element>, PartitionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => {
                let bytes = read_file(path)?;
                partition_pdf(&bytes, path, filename, self.strategy)
            }
            "txt" | "text" => {
                let bytes = read_file(path)?;
                let text = String::from_utf8_lossy(&bytes);
                Ok(partition_text(&text, filename, None, self.strategy))
            }
            _ => Err(PartitionError::UnsupportedType {
                path: path.to_path_buf(),
            }),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, PartitionError> {
    std::fs::read(path).map_err(|source| PartitionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn partition_pdf(
    bytes: &[u8],
    path: &Path,
    filename: &str,
    strategy: PartitionStrategy,
) -> Result<Vec<Element>, PartitionError> {
    let pdf_err = |e: pdf_extract::OutputError| PartitionError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    match strategy {
        PartitionStrategy::HiRes => {
            let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(pdf_err)?;
            let mut elements = Vec::new();
            for (i, page) in pages.iter().enumerate() {
                let page_number = u32::try_from(i + 1).ok();
                elements.extend(partition_text(page, filename, page_number, strategy));
            }
            Ok(elements)
        }
        PartitionStrategy::Fast => {
            let text = pdf_extract::extract_text_from_mem(bytes).map_err(pdf_err)?;
            Ok(partition_text(&text, filename, None, strategy))
        }
    }
}

/// Split text into blank-line separated blocks and classify each block.
pub fn partition_text(
    text: &str,
    filename: &str,
    page_number: Option<u32>,
    strategy: PartitionStrategy,
) -> Vec<Element> {
    let normalized = text.replace("\r\n", "\n").replace('\u{c}', "\n\n");

    normalized
        .split("\n\n")
        .filter_map(|block| {
            let lines: Vec<&str> = block
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if lines.is_empty() {
                return None;
            }
            let kind = match strategy {
                PartitionStrategy::HiRes => classify_block(&lines),
                PartitionStrategy::Fast => ElementKind::NarrativeText,
            };
            Some(Element {
                kind,
                text: lines.join(" "),
                filename: filename.to_string(),
                page_number,
            })
        })
        .collect()
}

fn classify_block(lines: &[&str]) -> ElementKind {
    let first = lines[0];
    if is_list_marker(first) {
        return ElementKind::ListItem;
    }
    if lines.len() == 1 && looks_like_title(first) {
        return ElementKind::Title;
    }
    ElementKind::NarrativeText
}

fn is_list_marker(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix(['•', '-', '*', '–', '▪']) {
        return rest.starts_with(' ');
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return false;
    }
    let rest = &line[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

fn looks_like_title(line: &str) -> bool {
    if line.chars().count() > TITLE_MAX_CHARS {
        return false;
    }
    if line.split_whitespace().count() > TITLE_MAX_WORDS {
        return false;
    }
    if !line.chars().any(char::is_alphabetic) {
        return false;
    }
    !line.ends_with(['.', ',', ';', '!', '?'])
}
