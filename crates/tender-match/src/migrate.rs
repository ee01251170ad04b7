//! Database schema migrations.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running `tm init`
//! repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One extracted-text record per (doc_type, content_hash).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_outputs (
            doc_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            text TEXT NOT NULL,
            tables_json TEXT NOT NULL DEFAULT '[]',
            tender_id TEXT,
            profile_ids_json TEXT NOT NULL DEFAULT '[]',
            indexed INTEGER NOT NULL DEFAULT 0,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            index_model TEXT,
            indexed_at INTEGER,
            index_error TEXT,
            failed_at INTEGER,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (doc_type, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summary_embeddings (
            doc_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            chunk_count INTEGER NOT NULL,
            model_name TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            PRIMARY KEY (doc_type, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            content_hashes_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenders (
            id TEXT PRIMARY KEY,
            title TEXT,
            reference_no TEXT,
            pdf_url TEXT,
            duration TEXT,
            source TEXT,
            location TEXT,
            dept TEXT,
            deadline TEXT,
            expires_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector collections, keyed by collection name.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outputs_pending ON document_outputs(doc_type, indexed)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
