//! Title-aware chunk aggregation.
//!
//! Groups partitioned [`Element`]s into [`Chunk`]s bounded by three
//! character thresholds from [`ChunkingConfig`]:
//!
//! - `max_characters`: hard ceiling. Elements longer than this are split
//!   at the last whitespace before the limit (or hard-split mid-word).
//! - `new_after_n_chars`: soft ceiling. Once a chunk reaches it, the next
//!   element starts a new chunk even if it would still fit.
//! - `combine_text_under_n_chars`: a chunk shorter than this is merged
//!   into its neighbour when the result still fits `max_characters`.
//!
//! # Algorithm
//!
//! 1. A [`ElementKind::Title`] closes the current chunk and opens a new
//!    section, so chunks never straddle headings.
//! 2. Within a section, elements are joined with `\n\n` until adding the
//!    next one would pass `max_characters` or the chunk has reached
//!    `new_after_n_chars`.
//! 3. A final pass merges undersized chunks forward into the next chunk,
//!    and a trailing undersized chunk back into the previous one.
//!
//! Each chunk carries the source file name and the page of its first element.
//! Lengths are counted in `char`s.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Element, ElementKind};

const SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = 2;

struct Pending {
    text: String,
    len: usize,
    source: String,
    page_number: Option<u32>,
}

impl Pending {
    fn start(text: String, len: usize, el: &Element) -> Self {
        Self {
            text,
            len,
            source: el.filename.clone(),
            page_number: el.page_number,
        }
    }

    fn push(&mut self, text: &str, len: usize) {
        self.text.push_str(SEPARATOR);
        self.text.push_str(text);
        self.len += SEPARATOR_LEN + len;
    }

    fn into_chunk(self) -> Chunk {
        Chunk {
            text: self.text,
            source: self.source,
            page_number: self.page_number,
        }
    }
}

/// Aggregate elements into chunks. Returns an empty vector if every
/// element is blank.
pub fn chunk_by_title(elements: &[Element], cfg: &ChunkingConfig) -> Vec<Chunk> {
    let max = cfg.max_characters.max(1);
    let soft = cfg.new_after_n_chars.clamp(1, max);

    let mut chunks: Vec<Pending> = Vec::new();
    let mut current: Option<Pending> = None;

    for el in elements {
        let trimmed = el.text.trim();
        if trimmed.is_empty() {
            continue;
        }

        if el.kind == ElementKind::Title {
            if let Some(done) = current.take() {
                chunks.push(done);
            }
        }

        for piece in split_oversized(trimmed, max) {
            let len = piece.chars().count();
            current = match current.take() {
                None => Some(Pending::start(piece, len, el)),
                Some(mut open) => {
                    if open.len >= soft || open.len + SEPARATOR_LEN + len > max {
                        chunks.push(open);
                        Some(Pending::start(piece, len, el))
                    } else {
                        open.push(&piece, len);
                        Some(open)
                    }
                }
            };
        }
    }

    if let Some(done) = current.take() {
        chunks.push(done);
    }

    combine_small(chunks, cfg.combine_text_under_n_chars, max)
        .into_iter()
        .map(Pending::into_chunk)
        .collect()
}

fn combine_small(chunks: Vec<Pending>, under: usize, max: usize) -> Vec<Pending> {
    let mut out: Vec<Pending> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match out.last_mut() {
            Some(prev) if prev.len < under && prev.len + SEPARATOR_LEN + chunk.len <= max => {
                prev.push(&chunk.text, chunk.len);
            }
            _ => out.push(chunk),
        }
    }

    // Trailing fragment has no successor to merge into; fold it backwards.
    if out.len() >= 2 {
        let last_len = out[out.len() - 1].len;
        let prev_len = out[out.len() - 2].len;
        if last_len < under && prev_len + SEPARATOR_LEN + last_len <= max {
            if let Some(last) = out.pop() {
                if let Some(prev) = out.last_mut() {
                    prev.push(&last.text, last.len);
                }
            }
        }
    }

    out
}

/// Split `text` into pieces of at most `max_chars` chars, preferring to
/// break at the last whitespace before the limit.
fn split_oversized(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let split_at = match remaining[..limit].rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => pos,
            _ => limit,
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        pieces.push(remaining.to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(kind: ElementKind, text: &str, page: u32) -> Element {
        Element {
            kind,
            text: text.to_string(),
            filename: "syllabus.pdf".to_string(),
            page_number: Some(page),
        }
    }

    fn cfg(max: usize, soft: usize, under: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_characters: max,
            new_after_n_chars: soft,
            combine_text_under_n_chars: under,
        }
    }

    #[test]
    fn test_single_section_single_chunk() {
        let els = vec![
            el(ElementKind::Title, "Grading", 1),
            el(ElementKind::NarrativeText, "Exams are worth half.", 1),
        ];
        let chunks = chunk_by_title(&els, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Grading\n\nExams are worth half.");
        assert_eq!(chunks[0].source, "syllabus.pdf");
        assert_eq!(chunks[0].page_number, Some(1));
    }

    #[test]
    fn test_titles_start_new_chunks() {
        let body = "x".repeat(60);
        let els = vec![
            el(ElementKind::Title, "Part One", 1),
            el(ElementKind::NarrativeText, &body, 1),
            el(ElementKind::Title, "Part Two", 2),
            el(ElementKind::NarrativeText, &body, 2),
        ];
        let chunks = chunk_by_title(&els, &cfg(200, 160, 0));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("Part One"));
        assert!(chunks[1].text.starts_with("Part Two"));
        assert_eq!(chunks[1].page_number, Some(2));
    }

    #[test]
    fn test_small_sections_are_combined() {
        let els = vec![
            el(ElementKind::Title, "A", 1),
            el(ElementKind::NarrativeText, "short", 1),
            el(ElementKind::Title, "B", 1),
            el(ElementKind::NarrativeText, "also short", 1),
        ];
        let chunks = chunk_by_title(&els, &cfg(200, 160, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A\n\nshort\n\nB\n\nalso short");
    }

    #[test]
    fn test_soft_threshold_starts_new_chunk() {
        let para = "y".repeat(40);
        let els: Vec<Element> = (0..4)
            .map(|_| el(ElementKind::NarrativeText, &para, 1))
            .collect();
        // Two paragraphs reach 82 >= 80, so the third opens a new chunk.
        let chunks = chunk_by_title(&els, &cfg(1000, 80, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 82);
    }

    #[test]
    fn test_no_chunk_exceeds_max() {
        let words = (0..400)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let els = vec![el(ElementKind::NarrativeText, &words, 3)];
        let chunks = chunk_by_title(&els, &cfg(300, 240, 50));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 300, "chunk too long: {}", c.text.len());
            assert_eq!(c.page_number, Some(3));
        }
    }

    #[test]
    fn test_trailing_fragment_merged_backwards() {
        let big = "z".repeat(90);
        let els = vec![
            el(ElementKind::Title, "Big", 1),
            el(ElementKind::NarrativeText, &big, 1),
            el(ElementKind::Title, "End", 2),
        ];
        let chunks = chunk_by_title(&els, &cfg(200, 160, 20));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("End"));
    }

    #[test]
    fn test_split_oversized_multibyte() {
        let text = "ééééé ééééé ééééé";
        let pieces = split_oversized(text, 6);
        assert_eq!(pieces, vec!["ééééé", "ééééé", "ééééé"]);
    }

    #[test]
    fn test_hard_split_without_whitespace() {
        let pieces = split_oversized(&"a".repeat(25), 10);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2].len(), 5);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_by_title(&[], &ChunkingConfig::default()).is_empty());
        let blank = vec![el(ElementKind::NarrativeText, "   ", 1)];
        assert!(chunk_by_title(&blank, &ChunkingConfig::default()).is_empty());
    }
}
