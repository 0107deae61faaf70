//! Intent-aware reranking of raw similarity candidates.
//!
//! Raw vector-similarity scores are adjusted with additive boosts and
//! penalties derived from how well each chunk's path, title, heading, and
//! content align with the detected query intent. After adjustment the
//! candidate set is deduplicated per source document, release/announcement
//! documents are suppressed for non-release intents, and the survivors are
//! sorted and trimmed to the requested size.
//!
//! Everything in this module is pure and deterministic: identical inputs
//! produce identical output, with ties broken by raw score and then by
//! document path.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::intent::QueryIntent;
use crate::models::DocumentChunk;

// Docs-section path markers the corpus is organized around.
const CONFIG_SECTION: &str = "03-configuration";
const INTRO_SECTIONS: [&str; 2] = ["01-getting-started", "02-core-concepts"];
const PERFORMANCE_SECTION: &str = "04-seo-performance";
const VERSION_SECTION: &str = "05-version";

const CONFIG_CONTENT_TOKENS: [&str; 5] = ["vite.config", "defineconfig", "plugins", "alias", "proxy"];
const CONFIG_HEADING_TOKENS: [&str; 5] = ["proxy", "config", "server", "代理", "配置"];
const COMPARISON_TERMS: [&str; 7] = ["对比", "比较", "差异", "区别", "difference", "vs", "versus"];
const RELEASE_TERMS: [&str; 7] = [
    "release",
    "released",
    "announcing",
    "changelog",
    "breaking change",
    "变更",
    "发布",
];

/// Whether a chunk belongs to a release/announcement document, judged by
/// its path or title signature.
pub fn is_release_document(chunk: &DocumentChunk) -> bool {
    let path = chunk.document_path.to_lowercase();
    let title = chunk.title.to_lowercase();
    path.contains(VERSION_SECTION)
        || path.contains("announcing")
        || path.contains("release")
        || title.contains("announcing")
        || title.contains("release")
        || title.contains("发布")
}

/// Additive score adjustment for a chunk under a given intent.
///
/// Rules stack; a single chunk can collect several boosts and penalties.
/// The catch-all release penalty applies only when no intent-specific
/// release rule already fired, so release documents are never penalized
/// twice for the same signal.
pub fn intent_boost(chunk: &DocumentChunk, intent: QueryIntent) -> f64 {
    let path = chunk.document_path.to_lowercase();
    let title = chunk.title.to_lowercase();
    let content = chunk.content.to_lowercase();

    let mut boost = 0.0;
    let mut release_rule_fired = false;

    match intent {
        QueryIntent::Configuration => {
            if path.contains(CONFIG_SECTION) || title.contains("config") || title.contains("配置")
            {
                boost += 0.2;
            }
            if let Some(heading) = &chunk.heading {
                let heading = heading.to_lowercase();
                if CONFIG_HEADING_TOKENS.iter().any(|t| heading.contains(t)) {
                    boost += 0.12;
                }
            }
            if is_release_document(chunk) {
                boost -= 0.55;
                release_rule_fired = true;
            }
            let matches = CONFIG_CONTENT_TOKENS
                .iter()
                .filter(|t| content.contains(*t))
                .count();
            boost += (matches as f64 * 0.05).min(0.18);
        }
        QueryIntent::Comparison => {
            if INTRO_SECTIONS.iter().any(|s| path.contains(s)) {
                boost += 0.25;
            }
            if is_release_document(chunk) {
                boost -= 0.4;
                release_rule_fired = true;
            }
            let matches = COMPARISON_TERMS
                .iter()
                .filter(|t| content.contains(*t) || title.contains(*t))
                .count();
            boost += (matches as f64 * 0.05).min(0.10);

            let penalties = RELEASE_TERMS
                .iter()
                .filter(|t| content.contains(*t) || title.contains(*t))
                .count();
            boost -= (penalties as f64 * 0.05).min(0.15);
        }
        QueryIntent::VersionRelease => {
            if path.contains(VERSION_SECTION) || path.contains("announcing") {
                boost += 0.2;
            }
            if path.contains(CONFIG_SECTION) {
                boost -= 0.1;
            }
        }
        QueryIntent::ConceptLearning => {
            if INTRO_SECTIONS.iter().any(|s| path.contains(s)) {
                boost += 0.2;
            }
            if is_release_document(chunk) {
                boost -= 0.2;
                release_rule_fired = true;
            }
        }
        QueryIntent::Performance => {
            if path.contains(PERFORMANCE_SECTION) {
                boost += 0.2;
            }
            if is_release_document(chunk) {
                boost -= 0.2;
                release_rule_fired = true;
            }
        }
        QueryIntent::General => {}
    }

    // Catch-all: release documents are off-topic for every non-release
    // intent, including general queries.
    if intent != QueryIntent::VersionRelease && !release_rule_fired && is_release_document(chunk) {
        boost -= 0.2;
    }

    boost
}

#[derive(Debug, Clone)]
struct Scored {
    chunk: DocumentChunk,
    raw: f64,
    adjusted: f64,
}

pub struct Reranker {
    similarity_threshold: f64,
}

impl Reranker {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Rerank raw similarity candidates for an intent.
    ///
    /// Returns at most `max_results` `(chunk, adjusted_score)` pairs with
    /// one chunk per document, adjusted scores in `[0.0, 1.0]`, sorted by
    /// adjusted score descending. `prefer_diverse` widens the release
    /// suppression fallback to the full deduplicated pool (used on merged
    /// expansion passes).
    pub fn rerank(
        &self,
        candidates: &[(DocumentChunk, f64)],
        intent: QueryIntent,
        max_results: usize,
        prefer_diverse: bool,
    ) -> Vec<(DocumentChunk, f64)> {
        if candidates.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let deduped = self.dedup_by_document(candidates, intent);

        let qualifying: Vec<Scored> = deduped
            .iter()
            .filter(|s| s.adjusted >= self.similarity_threshold)
            .cloned()
            .collect();

        // Never spuriously empty: fall back to the full deduplicated pool
        // when nothing clears the threshold.
        let mut pool = if qualifying.is_empty() {
            deduped.clone()
        } else {
            qualifying
        };

        if intent != QueryIntent::VersionRelease {
            let non_release: Vec<Scored> = pool
                .iter()
                .filter(|s| !is_release_document(&s.chunk))
                .cloned()
                .collect();
            if !non_release.is_empty() {
                pool = non_release;
            } else if prefer_diverse {
                let diverse: Vec<Scored> = deduped
                    .iter()
                    .filter(|s| !is_release_document(&s.chunk))
                    .cloned()
                    .collect();
                if !diverse.is_empty() {
                    pool = diverse;
                }
            }
        }

        pool.sort_by(compare_scored);
        pool.truncate(max_results);

        pool.into_iter()
            .map(|s| (s.chunk, s.adjusted.max(0.0)))
            .collect()
    }

    /// Score every candidate and keep only the best chunk per document.
    fn dedup_by_document(
        &self,
        candidates: &[(DocumentChunk, f64)],
        intent: QueryIntent,
    ) -> Vec<Scored> {
        let mut best: HashMap<String, Scored> = HashMap::new();

        for (chunk, raw) in candidates {
            let adjusted = (raw + intent_boost(chunk, intent)).clamp(0.0, 1.0);
            let scored = Scored {
                chunk: chunk.clone(),
                raw: *raw,
                adjusted,
            };
            match best.get(&chunk.document_path) {
                Some(current) if !beats(&scored, current) => {}
                _ => {
                    best.insert(chunk.document_path.clone(), scored);
                }
            }
        }

        let mut deduped: Vec<Scored> = best.into_values().collect();
        deduped.sort_by(compare_scored);
        deduped
    }
}

/// Whether `a` should replace `b` as a document's representative chunk.
fn beats(a: &Scored, b: &Scored) -> bool {
    match a.adjusted.partial_cmp(&b.adjusted).unwrap_or(Ordering::Equal) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match a.raw.partial_cmp(&b.raw).unwrap_or(Ordering::Equal) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => a.chunk.chunk_index < b.chunk.chunk_index,
        },
    }
}

/// Adjusted score descending, raw score descending, document path ascending.
fn compare_scored(a: &Scored, b: &Scored) -> Ordering {
    b.adjusted
        .partial_cmp(&a.adjusted)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.raw.partial_cmp(&a.raw).unwrap_or(Ordering::Equal))
        .then_with(|| a.chunk.document_path.cmp(&b.chunk.document_path))
}
