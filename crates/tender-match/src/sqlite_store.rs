//! SQLite-backed [`MetadataStore`] and [`VectorIndex`] implementations.
//!
//! Both share one [`SqlitePool`]. Vectors are stored as little-endian f32
//! BLOBs; vector queries are a brute-force cosine scan over one collection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tender_match_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use tender_match_core::index::{IndexHit, VectorIndex};
use tender_match_core::models::{
    DocType, DocumentOutput, EmbeddingMetadata, IndexEntry, Profile, SummaryEmbedding, Tender,
};
use tender_match_core::store::MetadataStore;

/// SQLite implementation of the [`MetadataStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn output_from_row(row: &SqliteRow) -> Result<DocumentOutput> {
    let doc_type: String = row.get("doc_type");
    let tables_json: String = row.get("tables_json");
    let profile_ids_json: String = row.get("profile_ids_json");
    let indexed: i64 = row.get("indexed");
    let chunk_count: i64 = row.get("chunk_count");

    Ok(DocumentOutput {
        content_hash: row.get("content_hash"),
        doc_type: doc_type.parse()?,
        text: row.get("text"),
        tables: serde_json::from_str(&tables_json).context("Corrupt tables_json")?,
        tender_id: row.get("tender_id"),
        profile_ids: serde_json::from_str(&profile_ids_json).context("Corrupt profile_ids_json")?,
        indexed: indexed != 0,
        chunk_count: chunk_count as usize,
        index_model: row.get("index_model"),
        indexed_at: row.get("indexed_at"),
        index_error: row.get("index_error"),
        failed_at: row.get("failed_at"),
    })
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    let status: String = row.get("status");
    let hashes_json: String = row.get("content_hashes_json");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(Profile {
        id: row.get("id"),
        name: row.get("name"),
        status: status.parse()?,
        content_hashes: serde_json::from_str(&hashes_json).context("Corrupt content_hashes_json")?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const OUTPUT_COLUMNS: &str = "doc_type, content_hash, text, tables_json, tender_id, \
    profile_ids_json, indexed, chunk_count, index_model, indexed_at, index_error, failed_at";

const PROFILE_COLUMNS: &str =
    "id, name, status, content_hashes_json, embedding, error, created_at, updated_at";

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_output(
        &self,
        doc_type: DocType,
        content_hash: &str,
    ) -> Result<Option<DocumentOutput>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_outputs WHERE doc_type = ? AND content_hash = ?",
            OUTPUT_COLUMNS
        ))
        .bind(doc_type.as_str())
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(output_from_row).transpose()
    }

    async fn upsert_output(&self, output: &DocumentOutput) -> Result<()> {
        // One statement, so concurrent first uploads of the same bytes both
        // keep their profile ids. Text and indexing state of an existing row
        // are never touched.
        sqlx::query(
            r#"
            INSERT INTO document_outputs (doc_type, content_hash, text, tables_json, tender_id,
                                          profile_ids_json, indexed, chunk_count, index_model,
                                          indexed_at, index_error, failed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_type, content_hash) DO UPDATE SET
                profile_ids_json = (
                    SELECT json_group_array(value) FROM (
                        SELECT value, 0 AS src, key FROM json_each(document_outputs.profile_ids_json)
                        UNION ALL
                        SELECT value, 1 AS src, key FROM json_each(excluded.profile_ids_json)
                        WHERE value NOT IN
                            (SELECT value FROM json_each(document_outputs.profile_ids_json))
                        ORDER BY src, key
                    )
                ),
                tender_id = COALESCE(document_outputs.tender_id, excluded.tender_id)
            "#,
        )
        .bind(output.doc_type.as_str())
        .bind(&output.content_hash)
        .bind(&output.text)
        .bind(serde_json::to_string(&output.tables)?)
        .bind(&output.tender_id)
        .bind(serde_json::to_string(&output.profile_ids)?)
        .bind(output.indexed as i64)
        .bind(output.chunk_count as i64)
        .bind(&output.index_model)
        .bind(output.indexed_at)
        .bind(&output.index_error)
        .bind(output.failed_at)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_indexed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        chunk_count: usize,
        model_name: &str,
        indexed_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE document_outputs
            SET indexed = 1, chunk_count = ?, index_model = ?, indexed_at = ?,
                index_error = NULL, failed_at = NULL
            WHERE doc_type = ? AND content_hash = ?
            "#,
        )
        .bind(chunk_count as i64)
        .bind(model_name)
        .bind(indexed_at)
        .bind(doc_type.as_str())
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_index_failed(
        &self,
        doc_type: DocType,
        content_hash: &str,
        error: &str,
        failed_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE document_outputs
            SET indexed = 0, index_error = ?, failed_at = ?
            WHERE doc_type = ? AND content_hash = ?
            "#,
        )
        .bind(error)
        .bind(failed_at)
        .bind(doc_type.as_str())
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_outputs(
        &self,
        doc_type: DocType,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentOutput>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM document_outputs WHERE doc_type = ? AND indexed = 0 \
             ORDER BY content_hash ASC LIMIT ?",
            OUTPUT_COLUMNS
        ))
        .bind(doc_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(output_from_row).collect()
    }

    async fn reset_indexed(&self, doc_type: DocType) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE document_outputs
            SET indexed = 0, chunk_count = 0, index_model = NULL, indexed_at = NULL
            WHERE doc_type = ?
            "#,
        )
        .bind(doc_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn get_summary(
        &self,
        doc_type: DocType,
        content_hash: &str,
    ) -> Result<Option<SummaryEmbedding>> {
        let row = sqlx::query(
            "SELECT embedding, chunk_count, model_name, indexed_at FROM summary_embeddings \
             WHERE doc_type = ? AND content_hash = ?",
        )
        .bind(doc_type.as_str())
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let blob: Vec<u8> = r.get("embedding");
            let chunk_count: i64 = r.get("chunk_count");
            SummaryEmbedding {
                content_hash: content_hash.to_string(),
                doc_type,
                summary: blob_to_vec(&blob),
                chunk_count: chunk_count as usize,
                model_name: r.get("model_name"),
                indexed_at: r.get("indexed_at"),
            }
        }))
    }

    async fn upsert_summary(&self, summary: &SummaryEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO summary_embeddings (doc_type, content_hash, embedding, chunk_count,
                                            model_name, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_type, content_hash) DO UPDATE SET
                embedding = excluded.embedding,
                chunk_count = excluded.chunk_count,
                model_name = excluded.model_name,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(summary.doc_type.as_str())
        .bind(&summary.content_hash)
        .bind(vec_to_blob(&summary.summary))
        .bind(summary.chunk_count as i64)
        .bind(&summary.model_name)
        .bind(summary.indexed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_summaries(&self, doc_type: DocType) -> Result<usize> {
        let result = sqlx::query("DELETE FROM summary_embeddings WHERE doc_type = ?")
            .bind(doc_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE id = ?",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, name, status, content_hashes_json, embedding, error,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                content_hashes_json = excluded.content_hashes_json,
                embedding = excluded.embedding,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(profile.status.as_str())
        .bind(serde_json::to_string(&profile.content_hashes)?)
        .bind(profile.embedding.as_deref().map(vec_to_blob))
        .bind(&profile.error)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn profiles_with_hash(&self, content_hash: &str) -> Result<Vec<Profile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles \
             WHERE EXISTS (SELECT 1 FROM json_each(profiles.content_hashes_json) WHERE value = ?) \
             ORDER BY id ASC",
            PROFILE_COLUMNS
        ))
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn get_tender(&self, id: &str) -> Result<Option<Tender>> {
        let row = sqlx::query(
            "SELECT id, title, reference_no, pdf_url, duration, source, location, dept, \
             deadline, expires_at FROM tenders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Tender {
            id: r.get("id"),
            title: r.get("title"),
            reference_no: r.get("reference_no"),
            pdf_url: r.get("pdf_url"),
            duration: r.get("duration"),
            source: r.get("source"),
            location: r.get("location"),
            dept: r.get("dept"),
            deadline: r.get("deadline"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn upsert_tender(&self, tender: &Tender) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenders (id, title, reference_no, pdf_url, duration, source, location,
                                 dept, deadline, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                reference_no = excluded.reference_no,
                pdf_url = excluded.pdf_url,
                duration = excluded.duration,
                source = excluded.source,
                location = excluded.location,
                dept = excluded.dept,
                deadline = excluded.deadline,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&tender.id)
        .bind(&tender.title)
        .bind(&tender.reference_no)
        .bind(&tender.pdf_url)
        .bind(&tender.duration)
        .bind(&tender.source)
        .bind(&tender.location)
        .bind(&tender.dept)
        .bind(&tender.deadline)
        .bind(tender.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// One named vector collection stored in the `index_entries` table.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    name: String,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, name: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (collection, id, document, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&self.name)
            .bind(&entry.id)
            .bind(&entry.document)
            .bind(vec_to_blob(&entry.embedding))
            .bind(serde_json::to_string(&entry.metadata)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<IndexHit>> {
        if n_results == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata_json FROM index_entries WHERE collection = ?",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: EmbeddingMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata in collection {}", self.name))?;
            let similarity = cosine_similarity(embedding, &blob_to_vec(&blob)) as f64;
            hits.push(IndexHit {
                id: row.get("id"),
                document: row.get("document"),
                metadata,
                distance: 1.0 - similarity,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_entries WHERE collection = ?")
            .bind(&self.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE collection = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
