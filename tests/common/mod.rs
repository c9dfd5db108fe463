//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ragwatch::config::ChunkingConfig;
use ragwatch::embedding::EmbeddingProvider;
use ragwatch::error::PartitionError;
use ragwatch::llm::{ChatMessage, ChatModel};
use ragwatch::models::{Element, ElementKind};
use ragwatch::partition::Partitioner;
use ragwatch::store::memory::InMemoryStore;
use ragwatch::store::VectorStore;

/// Bag-of-letters embedder: deterministic and good enough to rank
/// texts sharing words above unrelated ones.
pub struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().bytes() {
                    if c.is_ascii_lowercase() {
                        v[(c - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding API error 500: upstream down")
    }
}

/// Partitioner driven by file name:
/// - `bad*` fails like a corrupt PDF
/// - `empty*` yields no elements
/// - anything else yields `sections_for(name)` titled sections
pub struct ScriptedPartitioner {
    pub sections: usize,
}

impl Partitioner for ScriptedPartitioner {
    fn partition(&self, path: &Path, filename: &str) -> Result<Vec<Element>, PartitionError> {
        if filename.starts_with("bad") {
            return Err(PartitionError::Pdf {
                path: path.to_path_buf(),
                reason: "invalid file trailer".to_string(),
            });
        }
        if filename.starts_with("empty") {
            return Ok(Vec::new());
        }

        let mut elements = Vec::new();
        for i in 0..self.sections {
            let page = Some(i as u32 + 1);
            elements.push(Element {
                kind: ElementKind::Title,
                text: format!("Section {}", i + 1),
                filename: filename.to_string(),
                page_number: page,
            });
            elements.push(Element {
                kind: ElementKind::NarrativeText,
                text: format!("Body of section {} in {}.", i + 1, filename),
                filename: filename.to_string(),
                page_number: page,
            });
        }
        Ok(elements)
    }
}

/// One chunk per titled section.
pub fn section_chunking() -> ChunkingConfig {
    ChunkingConfig {
        max_characters: 3000,
        new_after_n_chars: 2400,
        combine_text_under_n_chars: 0,
    }
}

/// Replies with the last message it was given, prefixed, and counts calls.
#[derive(Default)]
pub struct EchoModel {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl EchoModel {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(format!(
            "turns={} | {}",
            messages.len(),
            messages.last().map(|m| m.content.as_str()).unwrap_or("")
        ))
    }
}

pub fn memory_store(embedder: Arc<dyn EmbeddingProvider>) -> Arc<VectorStore> {
    Arc::new(VectorStore::new(
        Arc::new(InMemoryStore::new()),
        embedder,
        "vectordb",
    ))
}

/// Minimal single-page PDF whose content stream shows `text`.
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
