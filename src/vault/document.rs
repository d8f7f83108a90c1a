use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use tracing::warn;

use crate::hashing::fingerprint_document;

/// A markdown note as seen by the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Vault-relative path with `/` separators.
    pub id: String,
    pub title: String,
    /// Text with the frontmatter block removed.
    pub body: String,
    /// Lowercase, without `#`, deduplicated and sorted.
    pub tags: Vec<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            modified_at: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Parses raw markdown: YAML frontmatter (`title`, `tags`) plus inline `#tags`.
    ///
    /// The title falls back to `fallback_title` (usually the file stem).
    pub fn parse(id: impl Into<String>, fallback_title: &str, raw: &str) -> Self {
        let id = id.into();
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let (frontmatter, body) = split_frontmatter(raw);

        let mut title = None;
        let mut tags = Vec::new();

        if let Some(yaml) = frontmatter {
            match serde_yaml::from_str::<YamlValue>(yaml) {
                Ok(value) => {
                    title = value
                        .get("title")
                        .and_then(scalar_to_string)
                        .filter(|t| !t.trim().is_empty());
                    tags.extend(frontmatter_tags(value.get("tags")));
                }
                Err(e) => {
                    warn!(document_id = %id, error = %e, "Ignoring malformed frontmatter");
                }
            }
        }

        let body = body.trim_start_matches(['\r', '\n']).to_string();
        tags.extend(inline_tags(&body));

        Self {
            title: title.unwrap_or_else(|| fallback_title.to_string()),
            tags: normalize_tags(tags),
            body,
            id,
            modified_at: None,
        }
    }

    /// Content fingerprint for the given chunking parameters.
    pub fn fingerprint(&self, chunk_size: usize, chunk_overlap: usize) -> String {
        fingerprint_document(
            &self.title,
            &self.tags,
            &self.body,
            chunk_size,
            chunk_overlap,
        )
    }

    /// Last modification as unix seconds.
    pub fn modified_unix(&self) -> Option<i64> {
        self.modified_at.map(|t| t.timestamp())
    }
}

/// Splits a leading `---` YAML block from the body.
///
/// Returns `(None, raw)` when there is no closed frontmatter block.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (None, raw);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let marker = line.trim_end();
        if marker == "---" || marker == "..." {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }

    (None, raw)
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn frontmatter_tags(value: Option<&YamlValue>) -> Vec<String> {
    match value {
        Some(YamlValue::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(YamlValue::String(s)) => s
            .split([',', ' '])
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Obsidian-style inline tags (`#tag`, `#area/sub-tag`) outside code fences.
///
/// Headings and purely numeric tokens are not tags.
pub fn inline_tags(body: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let mut prev: Option<char> = None;
        for (i, c) in line.char_indices() {
            if c == '#' && prev.is_none_or(char::is_whitespace) {
                let tag: String = line[i + 1..]
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/'))
                    .collect();
                if tag.chars().any(|c| !c.is_numeric()) {
                    tags.push(tag);
                }
            }
            prev = Some(c);
        }
    }

    tags
}

/// Lowercases, strips `#`, drops empties, deduplicates and sorts.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().trim_start_matches('#').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
