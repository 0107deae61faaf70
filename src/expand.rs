//! Rule-based query expansion for recall.
//!
//! Produces a small set of alternative phrasings for an under-filled
//! retrieval: a filler-stripped form of the query and intent-hinted
//! variants. All variants are deterministic functions of the input and are
//! deduplicated case-insensitively against the original query and each
//! other.

use crate::intent::QueryIntent;

const EN_FILLER_PREFIXES: [&str; 8] = [
    "what is ",
    "what are ",
    "how do i ",
    "how do you ",
    "how to ",
    "how does ",
    "why does ",
    "why is ",
];

const CJK_FILLER_PREFIXES: [&str; 4] = ["什么是", "如何", "为什么", "怎么"];
const CJK_FILLER_SUFFIXES: [&str; 3] = ["是什么", "吗", "呢"];

fn intent_hint(intent: QueryIntent) -> Option<&'static str> {
    match intent {
        QueryIntent::Configuration => Some("configuration options"),
        QueryIntent::Performance => Some("performance optimization"),
        QueryIntent::Comparison => Some("differences"),
        QueryIntent::VersionRelease => Some("release notes"),
        QueryIntent::ConceptLearning => Some("concepts"),
        QueryIntent::General => None,
    }
}

/// Strip interrogative filler from a query, leaving its topical core.
fn strip_fillers(query: &str) -> String {
    let mut text = query.trim().to_string();

    let lower = text.to_lowercase();
    for prefix in EN_FILLER_PREFIXES {
        if lower.starts_with(prefix) {
            text = text[prefix.len()..].to_string();
            break;
        }
    }
    for prefix in CJK_FILLER_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.to_string();
            break;
        }
    }
    for suffix in CJK_FILLER_SUFFIXES {
        if let Some(rest) = text.strip_suffix(suffix) {
            text = rest.to_string();
            break;
        }
    }

    text.trim().to_string()
}

/// Generate alternative phrasings for `query` under a detected intent.
///
/// May return an empty list (notably for short general queries with
/// nothing to strip). The original query never appears in the output.
pub fn expand(query: &str, intent: QueryIntent) -> Vec<String> {
    let base = query
        .trim()
        .trim_end_matches(['?', '？', '。', '.', '！', '!'])
        .trim();
    if base.is_empty() {
        return Vec::new();
    }

    let stripped = strip_fillers(base);

    let mut raw_variants = Vec::new();
    if !stripped.is_empty() {
        raw_variants.push(stripped.clone());
    }
    if let Some(hint) = intent_hint(intent) {
        if !stripped.is_empty() {
            raw_variants.push(format!("{stripped} {hint}"));
        }
        raw_variants.push(format!("{base} {hint}"));
    }

    let original_lower = query.trim().to_lowercase();
    let base_lower = base.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut variants = Vec::new();
    for variant in raw_variants {
        let lower = variant.to_lowercase();
        if lower == original_lower || lower == base_lower {
            continue;
        }
        if seen.contains(&lower) {
            continue;
        }
        seen.push(lower);
        variants.push(variant);
    }

    variants
}
