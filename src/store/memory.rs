//! In-memory [`Store`] for tests.
//!
//! Records live in a `Vec` per collection behind a `RwLock`. Search is
//! brute-force cosine similarity, same as the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{rank, Store, VectorRecord};
use crate::embedding::cosine_similarity;
use crate::models::SearchHit;

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(records.iter().cloned());
        Ok(())
    }

    async fn nearest(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let hits = records
            .iter()
            .filter(|r| r.vector.len() == query_vec.len())
            .map(|r| SearchHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(query_vec, &r.vector) as f64,
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self, collection: &str, source: Option<&str>) -> Result<i64> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let n = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| source.map_or(true, |s| r.metadata.source == s))
                    .count()
            })
            .unwrap_or(0);
        Ok(n as i64)
    }
}
