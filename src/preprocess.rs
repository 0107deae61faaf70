//! Markdown preprocessing: frontmatter extraction and content cleaning.
//!
//! Turns a raw markdown file into a cleaned body plus a
//! [`DocumentMetadata`] built from its YAML frontmatter. Invalid YAML is
//! tolerated — the frontmatter block is simply ignored and the document
//! keeps its defaults.

use std::path::Path;

use crate::models::DocumentMetadata;

/// Preprocess already-loaded markdown content.
///
/// Returns the cleaned body (frontmatter stripped, whitespace normalized)
/// and the metadata extracted from the frontmatter.
pub fn process_content(content: &str, path: &Path) -> (String, DocumentMetadata) {
    let (frontmatter, body) = extract_frontmatter(content);
    let metadata = build_metadata(frontmatter, path);
    let cleaned = clean_content(body);
    (cleaned, metadata)
}

/// Split a leading `--- ... ---` YAML frontmatter block off the content.
///
/// Returns the parsed mapping (if the block exists and parses) and the
/// remaining body.
fn extract_frontmatter(content: &str) -> (Option<serde_yaml::Mapping>, &str) {
    let rest = match content.strip_prefix("---") {
        Some(rest) if rest.starts_with('\n') || rest.starts_with("\r\n") => rest,
        _ => return (None, content),
    };

    // Find the closing delimiter on its own line.
    let mut search_from = 0;
    while let Some(pos) = rest[search_from..].find("\n---") {
        let delim_start = search_from + pos + 1;
        let after = &rest[delim_start + 3..];
        if after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n") {
            let yaml_text = &rest[..search_from + pos];
            let body = after.trim_start_matches(['\r', '\n']);
            let mapping = serde_yaml::from_str::<serde_yaml::Mapping>(yaml_text).ok();
            return (mapping, body);
        }
        search_from = delim_start + 3;
    }

    (None, content)
}

/// Build [`DocumentMetadata`] from a parsed frontmatter mapping, defaulting
/// the title from the filename when absent.
fn build_metadata(frontmatter: Option<serde_yaml::Mapping>, path: &Path) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();

    if let Some(mapping) = frontmatter {
        for (key, value) in mapping {
            let Some(key) = key.as_str() else { continue };
            match key {
                "title" => metadata.title = yaml_to_string(&value),
                "author" => metadata.author = yaml_to_string(&value),
                "date" => metadata.date = yaml_to_string(&value),
                "published" => {
                    if let Some(flag) = value.as_bool() {
                        metadata.published = flag;
                    }
                }
                "excerpt" => metadata.excerpt = yaml_to_string(&value),
                "tags" => metadata.tags = yaml_to_tags(&value),
                other => {
                    if let Ok(json) = serde_json::to_value(&value) {
                        metadata.extra.insert(other.to_string(), json);
                    }
                }
            }
        }
    }

    if metadata.title.is_none() {
        metadata.title = Some(title_from_filename(path));
    }

    metadata
}

fn yaml_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags may be a YAML list or a comma-separated string.
fn yaml_to_tags(value: &serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .filter_map(yaml_to_string)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        serde_yaml::Value::String(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Derive a display title from the filename: `getting-started.md` →
/// `Getting Started`.
fn title_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled Document".to_string());

    stem.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize line endings, strip HTML comments, and collapse runs of
/// blank lines.
fn clean_content(content: &str) -> String {
    let mut text = content.replace("\r\n", "\n").replace('\r', "\n");
    text = strip_html_comments(&text);

    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }

    text.trim().to_string()
}

fn strip_html_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => return out, // unterminated comment drops the tail
        }
    }
    out.push_str(rest);
    out
}
