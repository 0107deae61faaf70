//! SQLite-backed [`ChunkStore`].
//!
//! Chunks live in a single database file (WAL mode). Embeddings are stored
//! inline as little-endian f32 BLOBs and similarity is computed in Rust by
//! scanning all stored vectors; corpora here are documentation-sized, so a
//! full scan stays well under interactive latency.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::DocumentChunk;

use super::{finalize_hits, ChunkStore, SearchHit, StoreError, StoreResult, StoreStats};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run the
    /// schema migrations.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_path TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                title TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL,
                heading TEXT,
                heading_level INTEGER,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                word_count INTEGER NOT NULL,
                embedding BLOB,
                UNIQUE(document_path, chunk_index),
                FOREIGN KEY (document_path) REFERENCES documents(document_path)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_path ON chunks(document_path)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_chunk(row: &SqliteRow) -> StoreResult<DocumentChunk> {
    let chunk_id: String = row.get("chunk_id");
    let metadata_json: String = row.get("metadata_json");
    let metadata =
        serde_json::from_str(&metadata_json).map_err(|e| StoreError::Corrupt {
            chunk_id: chunk_id.clone(),
            reason: format!("metadata: {e}"),
        })?;

    Ok(DocumentChunk {
        chunk_id,
        document_path: row.get("document_path"),
        title: row.get("title"),
        content: row.get("content"),
        chunk_index: row.get("chunk_index"),
        start_char: row.get::<i64, _>("start_char") as usize,
        end_char: row.get::<i64, _>("end_char") as usize,
        heading: row.get("heading"),
        heading_level: row.get::<Option<i64>, _>("heading_level").map(|v| v as u8),
        metadata,
        word_count: row.get::<i64, _>("word_count") as usize,
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn fingerprint(&self, document_path: &str) -> StoreResult<Option<String>> {
        let fingerprint: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM documents WHERE document_path = ?")
                .bind(document_path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(fingerprint)
    }

    async fn upsert_document(
        &self,
        document_path: &str,
        fingerprint: &str,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> StoreResult<()> {
        if chunks.len() != vectors.len() {
            return Err(StoreError::Invalid(format!(
                "vector count {} does not match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let title = chunks
            .first()
            .map(|c| c.title.clone())
            .unwrap_or_else(|| "Untitled Document".to_string());
        let updated_at = chrono::Utc::now().timestamp();

        // One transaction so a reader never observes the document with
        // zero chunks mid-update.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (document_path, fingerprint, title, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(document_path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                title = excluded.title,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_path)
        .bind(fingerprint)
        .bind(&title)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE document_path = ?")
            .bind(document_path)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata).map_err(|e| {
                StoreError::Corrupt {
                    chunk_id: chunk.chunk_id.clone(),
                    reason: format!("metadata: {e}"),
                }
            })?;

            sqlx::query(
                r#"
                INSERT INTO chunks (
                    chunk_id, document_path, chunk_index, title, content,
                    start_char, end_char, heading, heading_level,
                    metadata_json, word_count, embedding
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_path)
            .bind(chunk.chunk_index)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(chunk.start_char as i64)
            .bind(chunk.end_char as i64)
            .bind(&chunk.heading)
            .bind(chunk.heading_level.map(i64::from))
            .bind(&metadata_json)
            .bind(chunk.word_count as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_path: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_path = ?")
            .bind(document_path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE document_path = ?")
            .bind(document_path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> StoreResult<Vec<SearchHit>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE embedding IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let score = f64::from(cosine_similarity(query_vector, &vector)).max(0.0);
            hits.push(SearchHit {
                chunk: row_to_chunk(row)?,
                score,
            });
        }

        Ok(finalize_hits(hits, limit))
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let vectors: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            vectors: vectors as usize,
        })
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
