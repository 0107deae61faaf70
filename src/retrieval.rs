//! Retrieval orchestration: intent → search → rerank → expand.
//!
//! [`Retriever`] ties the pipeline together. Failures in embedding or the
//! index degrade to an empty result list rather than propagating; callers
//! treat "no context found" as an answerable state, never as an error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingGateway;
use crate::expand;
use crate::intent::{self, QueryIntent};
use crate::models::DocumentChunk;
use crate::rerank::Reranker;
use crate::store::ChunkStore;

pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingGateway>,
    reranker: Reranker,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingGateway>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker: Reranker::new(config.similarity_threshold),
            config,
        }
    }

    /// Retrieve the most relevant chunks for a query.
    ///
    /// `top_k` is clamped to `1..=retrieval.top_k` (default cap 3) to
    /// bound downstream prompt size. Returns `(chunk, adjusted_score)`
    /// pairs; an empty list on any search failure.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<(DocumentChunk, f64)> {
        let max_results = top_k.clamp(1, self.config.top_k);
        let query_intent = intent::classify(query);

        match self.retrieve_inner(query, query_intent, max_results).await {
            Ok(results) => {
                debug!(
                    intent = %query_intent,
                    results = results.len(),
                    "retrieval complete"
                );
                results
            }
            Err(e) => {
                warn!(error = %e, "retrieval failed, returning no context");
                Vec::new()
            }
        }
    }

    /// Detected intent for a query; exposed for response metadata.
    pub fn classify(&self, query: &str) -> QueryIntent {
        intent::classify(query)
    }

    async fn retrieve_inner(
        &self,
        query: &str,
        query_intent: QueryIntent,
        max_results: usize,
    ) -> Result<Vec<(DocumentChunk, f64)>> {
        let mut pool = self.search(query).await?;
        let mut results = self
            .reranker
            .rerank(&pool, query_intent, max_results, false);

        if self.under_filled(&results, max_results) {
            for variant in expand::expand(query, query_intent) {
                match self.search(&variant).await {
                    Ok(more) => {
                        debug!(variant = %variant, candidates = more.len(), "query expansion");
                        merge_candidates(&mut pool, more);
                    }
                    // Expansion is best-effort recall; a failing variant
                    // must not discard what the primary search found.
                    Err(e) => {
                        warn!(variant = %variant, error = %e, "expansion search failed");
                        continue;
                    }
                }

                results = self.reranker.rerank(&pool, query_intent, max_results, true);
                if !self.under_filled(&results, max_results) {
                    break;
                }
            }
        }

        Ok(results)
    }

    /// Whether the result set still warrants query expansion. Short
    /// result lists count, and so do results carried by the reranker's
    /// below-threshold fallback pool: a score under the similarity
    /// threshold means no candidate actually qualified for that slot.
    fn under_filled(&self, results: &[(DocumentChunk, f64)], max_results: usize) -> bool {
        results.len() < max_results
            || results
                .iter()
                .any(|(_, score)| *score < self.config.similarity_threshold)
    }

    async fn search(&self, query: &str) -> Result<Vec<(DocumentChunk, f64)>> {
        let vector = self.embedder.embed_query(query).await?;
        let hits = self
            .store
            .search(&vector, self.config.candidate_limit)
            .await?;
        Ok(hits.into_iter().map(|h| (h.chunk, h.score)).collect())
    }
}

/// Merge new raw candidates into the pool, keeping the highest raw score
/// per chunk id.
fn merge_candidates(pool: &mut Vec<(DocumentChunk, f64)>, more: Vec<(DocumentChunk, f64)>) {
    let mut index: HashMap<String, usize> = pool
        .iter()
        .enumerate()
        .map(|(i, (c, _))| (c.chunk_id.clone(), i))
        .collect();

    for (chunk, score) in more {
        match index.get(&chunk.chunk_id) {
            Some(&i) => {
                if score > pool[i].1 {
                    pool[i].1 = score;
                }
            }
            None => {
                index.insert(chunk.chunk_id.clone(), pool.len());
                pool.push((chunk, score));
            }
        }
    }
}
