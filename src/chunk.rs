//! Heading-aware markdown chunker.
//!
//! Splits a cleaned document body into [`DocumentChunk`]s that respect a
//! configurable maximum size with overlap between consecutive chunks.
//! When `respect_headings` is set, the document is first divided into
//! sections at markdown headings so a chunk never straddles two sections.
//! Break points prefer paragraph boundaries, then sentence endings, then
//! line breaks, and never land inside a fenced code block.
//!
//! Each chunk receives a stable id of the form `"{document_path}#{index}"`
//! with indices contiguous from 0 across the whole document.

use crate::config::ChunkingConfig;
use crate::models::{DocumentChunk, DocumentMetadata};

pub struct MarkdownChunker {
    config: ChunkingConfig,
}

/// A heading-delimited slice of the document body.
struct Section<'a> {
    text: &'a str,
    /// Byte offset of `text` within the document body.
    base: usize,
    heading: Option<String>,
    heading_level: Option<u8>,
}

impl MarkdownChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split a cleaned document body into chunks.
    ///
    /// Empty input produces no chunks. Chunk indices are contiguous and
    /// `end_char > start_char` for every produced chunk.
    pub fn chunk_document(
        &self,
        content: &str,
        document_path: &str,
        metadata: &DocumentMetadata,
    ) -> Vec<DocumentChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let sections = if self.config.respect_headings {
            split_by_headings(content)
        } else {
            vec![Section {
                text: content,
                base: 0,
                heading: None,
                heading_level: None,
            }]
        };

        let mut chunks = Vec::new();
        let mut chunk_index: i64 = 0;

        for section in &sections {
            self.chunk_section(section, document_path, metadata, &mut chunk_index, &mut chunks);
        }

        chunks
    }

    fn chunk_section(
        &self,
        section: &Section<'_>,
        document_path: &str,
        metadata: &DocumentMetadata,
        chunk_index: &mut i64,
        out: &mut Vec<DocumentChunk>,
    ) {
        let text = section.text;
        let max = self.config.max_chunk_size;
        let fences = fenced_ranges(text);
        let section_start_index = *chunk_index;

        let mut start = 0usize;
        while start < text.len() {
            let mut end = floor_char_boundary(text, (start + max).min(text.len()));
            if end < text.len() {
                end = find_break_point(text, start, end, &fences);
            }
            if end <= start {
                // No break point made progress; hard-split at the limit.
                end = floor_char_boundary(text, (start + max).min(text.len()));
                if end <= start {
                    break;
                }
            }

            let piece = &text[start..end];
            let leading = piece.len() - piece.trim_start().len();
            let trimmed = piece.trim();

            // A trailing fragment below the minimum size is dropped rather
            // than stored as a degenerate chunk.
            if trimmed.len() < self.config.min_chunk_size && *chunk_index > section_start_index {
                break;
            }

            if !trimmed.is_empty() {
                let start_char = section.base + start + leading;
                out.push(make_chunk(
                    trimmed,
                    document_path,
                    metadata,
                    section.heading.clone(),
                    section.heading_level,
                    *chunk_index,
                    start_char,
                    start_char + trimmed.len(),
                ));
                *chunk_index += 1;
            }

            if end >= text.len() {
                break;
            }
            let next = ceil_char_boundary(text, end.saturating_sub(self.config.chunk_overlap));
            start = if next > start { next } else { end };
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    content: &str,
    document_path: &str,
    metadata: &DocumentMetadata,
    heading: Option<String>,
    heading_level: Option<u8>,
    chunk_index: i64,
    start_char: usize,
    end_char: usize,
) -> DocumentChunk {
    DocumentChunk {
        chunk_id: format!("{document_path}#{chunk_index}"),
        document_path: document_path.to_string(),
        title: metadata
            .title
            .clone()
            .unwrap_or_else(|| "Untitled Document".to_string()),
        content: content.to_string(),
        chunk_index,
        start_char,
        end_char,
        heading,
        heading_level,
        metadata: metadata.clone(),
        word_count: content.split_whitespace().count(),
    }
}

/// Divide the body into sections at markdown headings (`#` through
/// `######`). The heading line stays with its section; content before the
/// first heading forms a heading-less leading section.
fn split_by_headings(content: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut section_start = 0usize;
    let mut heading: Option<String> = None;
    let mut heading_level: Option<u8> = None;
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        if let Some((level, text)) = parse_heading(line) {
            let prior = &content[section_start..offset];
            if !prior.trim().is_empty() {
                sections.push(Section {
                    text: prior,
                    base: section_start,
                    heading: heading.clone(),
                    heading_level,
                });
            }
            section_start = offset;
            heading = Some(text);
            heading_level = Some(level);
        }
        offset += line.len();
    }

    let tail = &content[section_start..];
    if !tail.trim().is_empty() {
        sections.push(Section {
            text: tail,
            base: section_start,
            heading,
            heading_level,
        });
    }

    sections
}

/// Parse `## Title` into `(2, "Title")`; returns `None` for non-headings.
fn parse_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    let title = rest.strip_prefix(' ')?;
    Some((hashes as u8, title.trim().to_string()))
}

/// Byte ranges of fenced code blocks (``` ... ```). An unclosed fence
/// extends to the end of the text.
fn fenced_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut search = 0usize;
    loop {
        let Some(open_rel) = text[search..].find("```") else {
            break;
        };
        let open = search + open_rel;
        match text[open + 3..].find("```") {
            Some(close_rel) => {
                let close = open + 3 + close_rel + 3;
                ranges.push((open, close));
                search = close;
            }
            None => {
                ranges.push((open, text.len()));
                break;
            }
        }
    }
    ranges
}

/// Find a break point in `(start, end]` that avoids splitting inside code
/// fences, preferring paragraph breaks, then sentence endings, then line
/// breaks, then whitespace.
fn find_break_point(text: &str, start: usize, end: usize, fences: &[(usize, usize)]) -> usize {
    // Never split inside a fenced block: either stop before it or swallow
    // the whole block.
    for &(open, close) in fences {
        if end > open && end < close {
            return if start < open { open } else { close.min(text.len()) };
        }
    }

    let window = &text[start..end];

    if let Some(pos) = window.rfind("\n\n") {
        return start + pos + 2;
    }

    let sentence_ends = [". ", ".\n", "! ", "? ", "。", "！", "？"];
    let best = sentence_ends
        .iter()
        .filter_map(|pat| window.rfind(pat).map(|p| p + pat.len()))
        .max();
    if let Some(pos) = best {
        return start + pos;
    }

    if let Some(pos) = window.rfind('\n') {
        return start + pos + 1;
    }
    if let Some(pos) = window.rfind(' ') {
        return start + pos + 1;
    }

    end
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize) -> MarkdownChunker {
        MarkdownChunker::new(ChunkingConfig {
            max_chunk_size: max,
            chunk_overlap: overlap,
            respect_headings: true,
            min_chunk_size: 10,
        })
    }

    fn meta() -> DocumentMetadata {
        DocumentMetadata {
            title: Some("Guide".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn small_document_single_chunk() {
        let chunks = chunker(1000, 200).chunk_document("Hello, world! More text here.", "d.md", &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_id, "d.md#0");
        assert_eq!(chunks[0].title, "Guide");
    }

    #[test]
    fn empty_document_no_chunks() {
        let chunks = chunker(1000, 200).chunk_document("  \n\n ", "d.md", &meta());
        assert!(chunks.is_empty());
    }

    #[test]
    fn headings_carry_into_chunks() {
        let content = "Intro paragraph before headings.\n\n# Setup\n\nInstall the thing first.\n\n## Proxy\n\nConfigure the proxy after install.";
        let chunks = chunker(1000, 200).chunk_document(content, "d.md", &meta());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading, None);
        assert_eq!(chunks[1].heading.as_deref(), Some("Setup"));
        assert_eq!(chunks[1].heading_level, Some(1));
        assert_eq!(chunks[2].heading.as_deref(), Some("Proxy"));
        assert_eq!(chunks[2].heading_level, Some(2));
    }

    #[test]
    fn indices_contiguous_across_sections() {
        let content = (0..8)
            .map(|i| format!("# Section {i}\n\nParagraph for section number {i}, with enough words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunker(1000, 100).chunk_document(&content, "d.md", &meta());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert!(chunk.end_char > chunk.start_char);
        }
    }

    #[test]
    fn long_section_splits_with_progress() {
        let content = "word ".repeat(400);
        let chunks = chunker(200, 50).chunk_document(&content, "d.md", &meta());
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char > pair[0].start_char);
        }
    }

    #[test]
    fn offsets_point_into_body() {
        let content = "# One\n\nAlpha beta gamma delta paragraph.\n\n# Two\n\nSecond section body text here.";
        let chunks = chunker(1000, 200).chunk_document(content, "d.md", &meta());
        for chunk in &chunks {
            assert_eq!(&content[chunk.start_char..chunk.end_char], chunk.content);
        }
    }

    #[test]
    fn multibyte_text_never_panics() {
        let content = "配置代理需要在配置文件中设置。".repeat(40);
        let chunks = chunker(100, 20).chunk_document(&content, "d.md", &meta());
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.content.chars().count() > 0);
        }
    }

    #[test]
    fn break_avoids_code_fence_interior() {
        let fence = format!("```\n{}\n```", "let x = 1;\n".repeat(20));
        let content = format!("Lead-in paragraph.\n\n{fence}\n\nTrailing paragraph.");
        let chunks = chunker(120, 20).chunk_document(&content, "d.md", &meta());
        // No chunk may end strictly inside the fence.
        let open = content.find("```").unwrap();
        let close = content.rfind("```").unwrap() + 3;
        for chunk in &chunks {
            assert!(
                chunk.end_char <= open || chunk.end_char >= close || chunk.start_char >= open,
                "chunk ends mid-fence: {}..{}",
                chunk.start_char,
                chunk.end_char
            );
        }
    }

    #[test]
    fn deterministic() {
        let content = "# A\n\nSome text, repeated.\n\n# B\n\nOther text that follows.";
        let a = chunker(50, 10).chunk_document(content, "d.md", &meta());
        let b = chunker(50, 10).chunk_document(content, "d.md", &meta());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.chunk_id, y.chunk_id);
        }
    }
}
