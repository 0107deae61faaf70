//! Storage abstraction for the chunk index.
//!
//! The [`ChunkStore`] trait defines every persistence operation the
//! ingestion and retrieval pipelines need, enabling pluggable backends:
//! the production SQLite store and an in-memory store for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::DocumentChunk;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt chunk record {chunk_id}: {reason}")]
    Corrupt { chunk_id: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A chunk matched by vector search, with its raw similarity score.
///
/// Scores are cosine similarity floored at `0.0`, so they always lie in
/// `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// Index-level counters for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
}

/// Abstract storage backend for document chunks and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fingerprint`](ChunkStore::fingerprint) | Stored fingerprint for a document |
/// | [`upsert_document`](ChunkStore::upsert_document) | Atomically replace a document's chunk set |
/// | [`delete_document`](ChunkStore::delete_document) | Remove a document and its chunks |
/// | [`search`](ChunkStore::search) | Cosine similarity vector search |
/// | [`stats`](ChunkStore::stats) | Index-level counters |
/// | [`clear`](ChunkStore::clear) | Drop the entire index |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Stored ingestion fingerprint for a document, if any.
    async fn fingerprint(&self, document_path: &str) -> StoreResult<Option<String>>;

    /// Replace all chunks and vectors for a document and record its
    /// fingerprint.
    ///
    /// The delete-then-insert must be atomic from a reader's view: a
    /// concurrent search never observes the document with zero chunks
    /// mid-update. `vectors` must have one entry per chunk.
    async fn upsert_document(
        &self,
        document_path: &str,
        fingerprint: &str,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> StoreResult<()>;

    /// Remove a document, its chunks, and its fingerprint.
    async fn delete_document(&self, document_path: &str) -> StoreResult<()>;

    /// Brute-force cosine similarity search over all stored vectors.
    ///
    /// Returns up to `limit` hits sorted by score descending, ties broken
    /// by chunk id ascending. Negative cosine values are floored to `0.0`.
    async fn search(&self, query_vector: &[f32], limit: usize) -> StoreResult<Vec<SearchHit>>;

    /// Counters over the stored corpus.
    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Remove every document, chunk, and vector.
    async fn clear(&self) -> StoreResult<()>;
}

/// Sort hits by score descending, chunk id ascending, and truncate.
pub(crate) fn finalize_hits(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    hits.truncate(limit);
    hits
}
