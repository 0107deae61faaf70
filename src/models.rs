//! Core data models for the documentation Q&A pipeline.
//!
//! These types represent the documents, chunks, and results that flow
//! through ingestion and retrieval.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metadata extracted from a document's YAML frontmatter.
///
/// All fields are optional in the source file; `published` defaults to
/// `true` when absent. Unknown frontmatter keys are preserved in `extra`
/// so they round-trip through the chunk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_published() -> bool {
    true
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            date: None,
            published: true,
            excerpt: None,
            tags: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A contiguous slice of a source document prepared for retrieval.
///
/// Chunks are immutable once created; when the owning document changes the
/// whole chunk set is replaced via
/// [`ChunkStore::upsert_document`](crate::store::ChunkStore::upsert_document).
/// `chunk_index` values are contiguous non-negative integers per document,
/// assigned in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Stable identifier, `"{document_path}#{chunk_index}"`.
    pub chunk_id: String,
    /// Source-relative or absolute identifier of the owning document.
    pub document_path: String,
    /// Owning document's title.
    pub title: String,
    /// Chunk text.
    pub content: String,
    /// 0-based position within the document.
    pub chunk_index: i64,
    /// Byte offset into the cleaned document body.
    pub start_char: usize,
    /// Byte offset one past the end of the chunk span.
    pub end_char: usize,
    /// Nearest enclosing section heading, if any.
    pub heading: Option<String>,
    /// Heading level (1-6) of `heading`.
    pub heading_level: Option<u8>,
    /// Document-level metadata from frontmatter.
    pub metadata: DocumentMetadata,
    /// Whitespace-separated word count of `content`.
    pub word_count: usize,
}

impl DocumentChunk {
    /// Display path relative to the documentation root.
    ///
    /// Falls back to the bare filename when the document lives outside
    /// the root.
    pub fn relative_path(&self, docs_root: &Path) -> String {
        let doc_path = Path::new(&self.document_path);
        if let Ok(relative) = doc_path.strip_prefix(docs_root) {
            return relative.to_string_lossy().replace('\\', "/");
        }
        doc_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.document_path.clone())
    }
}

/// Summary of one ingestion run. Produced fresh per run, never persisted.
#[derive(Debug, Clone, Default)]
pub struct IngestionResult {
    pub documents_found: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub vectors_stored: usize,
    pub elapsed_secs: f64,
    pub errors: Vec<String>,
}

impl IngestionResult {
    /// Fraction of discovered documents handled without error, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.documents_found == 0 {
            return 0.0;
        }
        let ok = self.documents_found.saturating_sub(self.errors.len());
        ok as f64 / self.documents_found as f64 * 100.0
    }
}
