//! Schema for the vector store.
//!
//! Two tables: `collections` (one row per named collection) and
//! `documents` (text, JSON metadata, embedding BLOB). Statements are
//! idempotent, so migrations run on every store open.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect, migrate, register the configured collection, and close.
/// Used by `ragwatch init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    ensure_collection(&pool, &config.store.collection).await?;
    pool.close().await;
    Ok(())
}

pub async fn ensure_collection(pool: &SqlitePool, name: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            source TEXT NOT NULL,
            hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection_source ON documents(collection, source)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
