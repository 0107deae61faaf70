//! Incremental document ingestion.
//!
//! Coordinates discovery → fingerprinting → preprocessing → chunking →
//! embedding → storage. Each document carries a fingerprint derived from
//! its raw bytes, the chunking parameters, and the embedding model name;
//! a matching stored fingerprint means the document is skipped without
//! re-embedding. Files are processed in fixed-size concurrent batches and
//! a failure in one file never aborts the rest of the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::MarkdownChunker;
use crate::config::{ChunkingConfig, Config, DocsConfig};
use crate::embedding::EmbeddingGateway;
use crate::models::IngestionResult;
use crate::preprocess;
use crate::store::ChunkStore;

/// What happened to a single document during an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Stored fingerprint matched; nothing re-embedded.
    Unchanged,
    /// Frontmatter marked the document unpublished; removed from the index.
    Unpublished,
    /// Chunked, embedded, and upserted.
    Indexed { chunks: usize, vectors: usize },
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingGateway>,
    docs: DocsConfig,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingGateway>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            docs: config.docs.clone(),
            chunking: config.chunking.clone(),
            batch_size: config.ingestion.batch_size.max(1),
        }
    }

    /// Find every document under the docs root matching the include
    /// patterns and not matching the exclude patterns. Hidden files and
    /// directories (leading `.`) are always skipped. Paths come back
    /// deduplicated and sorted for a deterministic processing order.
    pub fn discover_documents(&self) -> Result<Vec<PathBuf>> {
        let root = &self.docs.root;
        if !root.exists() {
            bail!("Docs root does not exist: {}", root.display());
        }

        let include_set = build_globset(&self.docs.include_globs)?;
        let exclude_set = build_globset(&self.docs.exclude_globs)?;

        let mut paths = Vec::new();
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.path()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            paths.push(path.to_path_buf());
        }

        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Ingest every discovered document. `force` bypasses the fingerprint
    /// check and re-indexes everything.
    pub async fn ingest_all(&self, force: bool) -> Result<IngestionResult> {
        let started = Instant::now();
        let paths = self.discover_documents()?;
        info!(documents = paths.len(), "starting ingestion run");

        let mut result = IngestionResult {
            documents_found: paths.len(),
            ..Default::default()
        };
        let mut outcomes: Vec<(PathBuf, Result<FileOutcome>)> = Vec::with_capacity(paths.len());

        // Fixed-size batches cap peak concurrent embedding load.
        for batch in paths.chunks(self.batch_size) {
            let mut tasks = JoinSet::new();
            for path in batch {
                let pipeline = self.clone();
                let path = path.clone();
                tasks.spawn(async move {
                    let outcome = pipeline.ingest_file(&path, force).await;
                    (path, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(entry) => outcomes.push(entry),
                    Err(e) => result.errors.push(format!("ingestion task panicked: {e}")),
                }
            }
        }

        // Join order is nondeterministic; report in discovery order.
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, outcome) in outcomes {
            match outcome {
                Ok(FileOutcome::Unchanged) => {
                    debug!(path = %path.display(), "unchanged, skipped");
                    result.documents_skipped += 1;
                }
                Ok(FileOutcome::Unpublished) => {
                    debug!(path = %path.display(), "unpublished, skipped");
                    result.documents_skipped += 1;
                }
                Ok(FileOutcome::Indexed { chunks, vectors }) => {
                    result.documents_processed += 1;
                    result.chunks_created += chunks;
                    result.vectors_stored += vectors;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to ingest document");
                    result.documents_skipped += 1;
                    result.errors.push(format!("{}: {e:#}", path.display()));
                }
            }
        }

        result.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            processed = result.documents_processed,
            skipped = result.documents_skipped,
            chunks = result.chunks_created,
            errors = result.errors.len(),
            "ingestion run complete"
        );
        Ok(result)
    }

    /// Ingest a single file through the same fingerprint/chunk/embed path
    /// as a full run.
    pub async fn ingest_file(&self, path: &Path, force: bool) -> Result<FileOutcome> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        let document_path = self.document_path(path);
        let fingerprint = self.fingerprint(&bytes);

        if !force {
            let stored = self.store.fingerprint(&document_path).await?;
            if stored.as_deref() == Some(fingerprint.as_str()) {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let text = String::from_utf8_lossy(&bytes);
        let (content, metadata) = preprocess::process_content(&text, path);

        if !metadata.published {
            // Unpublishing removes previously indexed content.
            self.store.delete_document(&document_path).await?;
            return Ok(FileOutcome::Unpublished);
        }

        let chunker = MarkdownChunker::new(self.chunking.clone());
        let chunks = chunker.chunk_document(&content, &document_path, &metadata);

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await?
        };
        if vectors.len() != chunks.len() {
            bail!(
                "Embedding returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let count = chunks.len();
        self.store
            .upsert_document(&document_path, &fingerprint, &chunks, &vectors)
            .await?;

        Ok(FileOutcome::Indexed {
            chunks: count,
            vectors: count,
        })
    }

    /// Stable document identifier: path relative to the docs root with
    /// forward slashes, falling back to the full path for outsiders.
    pub fn document_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.docs.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Ingestion fingerprint: SHA-256 over the raw file bytes plus every
    /// parameter whose change must force re-indexing (chunking settings
    /// and the embedding model).
    pub fn fingerprint(&self, raw: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw);
        hasher.update(self.chunking.max_chunk_size.to_le_bytes());
        hasher.update(self.chunking.chunk_overlap.to_le_bytes());
        hasher.update([u8::from(self.chunking.respect_headings)]);
        hasher.update(self.embedder.model_name().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbConfig, EmbeddingConfig, IngestionConfig, RetrievalConfig};
    use crate::store::{ChunkStore, InMemoryStore};
    use async_trait::async_trait;

    /// Deterministic bag-of-words embedder for tests.
    struct HashEmbedder;

    #[async_trait]
    impl EmbeddingGateway for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash-v1"
        }

        fn dims(&self) -> usize {
            16
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; 16];
                    for word in text.split_whitespace() {
                        let bucket: usize =
                            word.bytes().map(|b| b as usize).sum::<usize>() % 16;
                        v[bucket] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn test_config(root: &Path) -> Config {
        Config {
            db: DbConfig {
                path: PathBuf::from(":memory:"),
            },
            docs: DocsConfig {
                root: root.to_path_buf(),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: vec!["**/README.md".to_string()],
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            ingestion: IngestionConfig { batch_size: 4 },
            llm: Default::default(),
            conversations: Default::default(),
        }
    }

    fn write_doc(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn pipeline(root: &Path, store: Arc<InMemoryStore>) -> IngestionPipeline {
        IngestionPipeline::new(store, Arc::new(HashEmbedder), &test_config(root))
    }

    #[tokio::test]
    async fn full_run_indexes_documents() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "guide/a.md", "---\ntitle: A\n---\n\nAlpha body text here.");
        write_doc(dir.path(), "guide/b.md", "# B\n\nBeta body text here.");
        write_doc(dir.path(), "README.md", "excluded");
        write_doc(dir.path(), ".hidden/c.md", "hidden");

        let store = Arc::new(InMemoryStore::new());
        let result = pipeline(dir.path(), store.clone()).ingest_all(false).await.unwrap();

        assert_eq!(result.documents_found, 2);
        assert_eq!(result.documents_processed, 2);
        assert!(result.errors.is_empty());
        assert!(result.chunks_created >= 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 2);
    }

    #[tokio::test]
    async fn second_run_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "a.md", "Alpha body text here.");

        let store = Arc::new(InMemoryStore::new());
        let pipe = pipeline(dir.path(), store.clone());

        let first = pipe.ingest_all(false).await.unwrap();
        assert_eq!(first.documents_processed, 1);

        let second = pipe.ingest_all(false).await.unwrap();
        assert_eq!(second.documents_processed, 0);
        assert_eq!(second.documents_skipped, 1);
    }

    #[tokio::test]
    async fn changed_file_is_reindexed() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "a.md", "Alpha body text here.");

        let store = Arc::new(InMemoryStore::new());
        let pipe = pipeline(dir.path(), store.clone());
        pipe.ingest_all(false).await.unwrap();

        write_doc(dir.path(), "a.md", "Alpha body text here, now edited.");
        let second = pipe.ingest_all(false).await.unwrap();
        assert_eq!(second.documents_processed, 1);
    }

    #[tokio::test]
    async fn force_reindexes_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "a.md", "Alpha body text here.");

        let store = Arc::new(InMemoryStore::new());
        let pipe = pipeline(dir.path(), store.clone());
        pipe.ingest_all(false).await.unwrap();

        let forced = pipe.ingest_all(true).await.unwrap();
        assert_eq!(forced.documents_processed, 1);
    }

    #[tokio::test]
    async fn unpublished_document_removed_from_index() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "a.md", "---\ntitle: A\n---\n\nAlpha body.");

        let store = Arc::new(InMemoryStore::new());
        let pipe = pipeline(dir.path(), store.clone());
        pipe.ingest_all(false).await.unwrap();
        assert_eq!(store.stats().await.unwrap().documents, 1);

        write_doc(
            dir.path(),
            "a.md",
            "---\ntitle: A\npublished: false\n---\n\nAlpha body.",
        );
        let second = pipe.ingest_all(false).await.unwrap();
        assert_eq!(second.documents_skipped, 1);
        assert_eq!(store.stats().await.unwrap().documents, 0);
    }

    #[test]
    fn fingerprint_sensitive_to_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let pipe = pipeline(dir.path(), store.clone());

        let base = pipe.fingerprint(b"content");
        assert_eq!(base, pipe.fingerprint(b"content"));
        assert_ne!(base, pipe.fingerprint(b"other content"));

        let mut config = test_config(dir.path());
        config.chunking.max_chunk_size = 512;
        let other = IngestionPipeline::new(store, Arc::new(HashEmbedder), &config);
        assert_ne!(base, other.fingerprint(b"content"));
    }

    #[tokio::test]
    async fn chunking_config_change_triggers_reindex() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "a.md", "Alpha body text here.");

        let store = Arc::new(InMemoryStore::new());
        pipeline(dir.path(), store.clone())
            .ingest_all(false)
            .await
            .unwrap();

        let mut config = test_config(dir.path());
        config.chunking.chunk_overlap = 50;
        let pipe = IngestionPipeline::new(store, Arc::new(HashEmbedder), &config);
        let second = pipe.ingest_all(false).await.unwrap();
        assert_eq!(second.documents_processed, 1);
    }

    #[tokio::test]
    async fn discovery_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "z.md", "z");
        write_doc(dir.path(), "a.md", "a");
        write_doc(dir.path(), "m/inner.md", "m");

        let store = Arc::new(InMemoryStore::new());
        let paths = pipeline(dir.path(), store).discover_documents().unwrap();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(paths.len(), 3);
    }
}
