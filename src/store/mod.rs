//! Vector store: embed documents, persist them, retrieve by similarity.
//!
//! [`VectorStore`] is what the rest of the crate talks to. It owns an
//! [`EmbeddingProvider`] and a [`Store`] backend and names the collection
//! every document goes into. Backends only deal in vectors:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | Production; BLOB vectors, brute-force cosine |
//! | [`memory::InMemoryStore`] | Tests |
//!
//! A batch passed to [`VectorStore::add_documents`] is embedded in full
//! before anything is written, and the backend inserts it in a single
//! transaction: a file's chunks are stored all together or not at all.
//! Every vector must have exactly `embedder.dims()` components; a provider
//! that returns anything else fails the batch.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{DocumentMetadata, SearchHit, StoredDocument};

/// A document ready for a backend: text, metadata and its vector.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub hash: String,
    pub model: String,
    pub vector: Vec<f32>,
}

/// Storage backend for embedded documents.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert every record or none of them.
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// The `k` records most similar to `query_vec`, best first. Only
    /// records with the same dimension as `query_vec` are candidates.
    async fn nearest(&self, collection: &str, query_vec: &[f32], k: usize)
        -> Result<Vec<SearchHit>>;

    /// Number of records in the collection, optionally only those whose
    /// `metadata.source` equals `source`.
    async fn count(&self, collection: &str, source: Option<&str>) -> Result<i64>;
}

pub struct VectorStore {
    backend: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl VectorStore {
    pub fn new(
        backend: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed and persist `docs`. Returns the new ids in input order.
    pub async fn add_documents(&self, docs: &[StoredDocument]) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != docs.len() {
            bail!(
                "embedding provider returned {} vectors for {} documents",
                vectors.len(),
                docs.len()
            );
        }

        for vector in &vectors {
            self.check_dims(vector)?;
        }

        let model = self.embedder.model_name().to_string();
        let records: Vec<VectorRecord> = docs
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| VectorRecord {
                id: uuid::Uuid::new_v4().to_string(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                hash: content_hash(&doc.text),
                model: model.clone(),
                vector,
            })
            .collect();

        self.backend.insert(&self.collection, &records).await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Embed `query` and return up to `k` nearest documents.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        self.check_dims(&query_vec)?;
        self.backend.nearest(&self.collection, &query_vec, k).await
    }

    pub async fn count(&self, source: Option<&str>) -> Result<i64> {
        self.backend.count(&self.collection, source).await
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedder.dims();
        if vector.len() != expected {
            bail!(
                "embedding model '{}' returned a {}-dimensional vector, expected {}",
                self.embedder.model_name(),
                vector.len(),
                expected
            );
        }
        Ok(())
    }
}

/// SHA-256 of the document text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sort by descending score and keep the first `k`.
pub(crate) fn rank(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    /// Two-dimensional embedder: mentions of "exam" vs everything else.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("exam") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    /// Declares 3 dimensions but returns 2.
    struct MisreportingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MisreportingEmbedder {
        fn model_name(&self) -> &str {
            "misreporting"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn doc(text: &str, source: &str, page: u32) -> StoredDocument {
        StoredDocument {
            text: text.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                pages: Some(page),
            },
        }
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let store = VectorStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(KeywordEmbedder),
            "vectordb",
        );
        let ids = store
            .add_documents(&[
                doc("The final exam is on June 1.", "syllabus.pdf", 2),
                doc("Office hours are Tuesdays.", "syllabus.pdf", 1),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let hits = store.similarity_search("when is the exam?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("final exam"));
        assert_eq!(hits[0].metadata.pages, Some(2));
        assert_eq!(store.count(Some("syllabus.pdf")).await.unwrap(), 2);
        assert_eq!(store.count(Some("other.pdf")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = VectorStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(KeywordEmbedder),
            "vectordb",
        );
        assert!(store.add_documents(&[]).await.unwrap().is_empty());
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_stores_nothing() {
        let store = VectorStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ShortEmbedder),
            "vectordb",
        );
        let err = store
            .add_documents(&[doc("a", "a.txt", 1), doc("b", "a.txt", 1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 documents"));
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let backend = Arc::new(InMemoryStore::new());
        let store = VectorStore::new(backend.clone(), Arc::new(MisreportingEmbedder), "vectordb");
        let err = store
            .add_documents(&[doc("a", "a.txt", 1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2-dimensional vector, expected 3"));
        assert_eq!(store.count(None).await.unwrap(), 0);
        assert!(store.similarity_search("a", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_search_ignores_vectors_of_other_dimensions() {
        let backend = Arc::new(InMemoryStore::new());
        backend
            .insert(
                "vectordb",
                &[VectorRecord {
                    id: "old".to_string(),
                    text: "exam notes from an older model".to_string(),
                    metadata: DocumentMetadata {
                        source: "old.pdf".to_string(),
                        pages: None,
                    },
                    hash: content_hash("exam notes from an older model"),
                    model: "older".to_string(),
                    vector: vec![1.0, 0.1, 0.0],
                }],
            )
            .await
            .unwrap();
        let store = VectorStore::new(backend, Arc::new(KeywordEmbedder), "vectordb");
        store
            .add_documents(&[doc("Office hours are Tuesdays.", "syllabus.pdf", 1)])
            .await
            .unwrap();

        let hits = store.similarity_search("exam", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.source, "syllabus.pdf");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
