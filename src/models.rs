//! Core data types that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A detected file waiting in the ingestion queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub filename: String,
}

impl FileTask {
    /// Builds a task from a path; the filename is the final path component.
    pub fn from_path(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_string_lossy().to_string();
        Some(Self {
            path: path.to_path_buf(),
            filename,
        })
    }
}

/// Kind of a partitioned content element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Title,
    ListItem,
    NarrativeText,
}

/// One typed piece of content produced by the partitioner, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub text: String,
    pub filename: String,
    /// 1-based page number; `None` for formats without pages.
    pub page_number: Option<u32>,
}

/// A bounded span of text produced by the chunk aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    /// Page of the first element in the chunk.
    pub page_number: Option<u32>,
}

/// Metadata stored next to every embedded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub pages: Option<u32>,
}

/// Text + metadata submitted to the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl From<&Chunk> for StoredDocument {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            metadata: DocumentMetadata {
                source: chunk.source.clone(),
                pages: chunk.page_number,
            },
        }
    }
}

/// A stored document returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    /// Cosine similarity to the query, in `[-1.0, 1.0]`.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_task_from_path() {
        let task = FileTask::from_path(Path::new("/data/uploads/base/syllabus.pdf")).unwrap();
        assert_eq!(task.filename, "syllabus.pdf");
        assert_eq!(task.path, PathBuf::from("/data/uploads/base/syllabus.pdf"));
        assert!(FileTask::from_path(Path::new("/")).is_none());
    }

    #[test]
    fn test_chunk_maps_to_stored_document() {
        let chunk = Chunk {
            text: "Deadline is May 3.".to_string(),
            source: "syllabus.pdf".to_string(),
            page_number: Some(2),
        };
        let doc = StoredDocument::from(&chunk);
        assert_eq!(doc.text, chunk.text);
        assert_eq!(doc.metadata.source, "syllabus.pdf");
        assert_eq!(doc.metadata.pages, Some(2));
        let json = serde_json::to_value(&doc.metadata).unwrap();
        assert_eq!(json, serde_json::json!({"source": "syllabus.pdf", "pages": 2}));
    }
}
