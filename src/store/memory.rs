//! In-memory [`ChunkStore`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over all stored vectors, matching the
//! SQLite backend's semantics exactly.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::DocumentChunk;

use super::{finalize_hits, ChunkStore, SearchHit, StoreError, StoreResult, StoreStats};

struct StoredDocument {
    fingerprint: String,
    chunks: Vec<(DocumentChunk, Vec<f32>)>,
}

/// In-memory store; the whole index lives behind one lock so upserts are
/// atomic with respect to searches.
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn fingerprint(&self, document_path: &str) -> StoreResult<Option<String>> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .get(document_path)
            .map(|doc| doc.fingerprint.clone()))
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

        let stored = StoredDocument {
            fingerprint: fingerprint.to_string(),
            chunks: chunks
                .iter()
                .cloned()
                .zip(vectors.iter().cloned())
                .collect(),
        };

        let mut documents = self.documents.write().unwrap();
        documents.insert(document_path.to_string(), stored);
        Ok(())
    }

    async fn delete_document(&self, document_path: &str) -> StoreResult<()> {
        let mut documents = self.documents.write().unwrap();
        documents.remove(document_path);
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> StoreResult<Vec<SearchHit>> {
        let documents = self.documents.read().unwrap();
        let mut hits = Vec::new();

        for doc in documents.values() {
            for (chunk, vector) in &doc.chunks {
                let score = f64::from(cosine_similarity(query_vector, vector)).max(0.0);
                hits.push(SearchHit {
                    chunk: chunk.clone(),
                    score,
                });
            }
        }

        Ok(finalize_hits(hits, limit))
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let documents = self.documents.read().unwrap();
        let chunks: usize = documents.values().map(|d| d.chunks.len()).sum();
        Ok(StoreStats {
            documents: documents.len(),
            chunks,
            vectors: chunks,
        })
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut documents = self.documents.write().unwrap();
        documents.clear();
        Ok(())
    }
}
