//! SQLite-backed [`Store`].
//!
//! Vectors are little-endian `f32` BLOBs in the `documents` table. Search
//! loads every vector in the collection and ranks by cosine similarity,
//! which is fine for the document counts a single upload folder produces.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{rank, Store, VectorRecord};
use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{DocumentMetadata, SearchHit};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `db.path` and apply migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO documents
                    (id, collection, text, metadata_json, source, hash, model, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(collection)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(&record.metadata.source)
            .bind(&record.hash)
            .bind(&record.model)
            .bind(record.vector.len() as i64)
            .bind(vec_to_blob(&record.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn nearest(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM documents WHERE collection = ? AND dims = ?",
        )
        .bind(collection)
        .bind(query_vec.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("corrupt metadata for document {}", id))?;
            let blob: Vec<u8> = row.get("embedding");
            hits.push(SearchHit {
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                text: row.get("text"),
                id,
                metadata,
            });
        }

        Ok(rank(hits, k))
    }

    async fn count(&self, collection: &str, source: Option<&str>) -> Result<i64> {
        let n: i64 = match source {
            Some(source) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM documents WHERE collection = ? AND source = ?",
                )
                .bind(collection)
                .bind(source)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
                    .bind(collection)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(n)
    }
}
