//! Note linking: related-note suggestions for a note being written.


use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::constants::LINK_REASON_CHARS;
use crate::embedding::EmbeddingGateway;
use crate::retrieval::{EvidenceItem, EvidenceRetriever, RetrievalError};
use crate::vectordb::VectorDbClient;

/// A suggested `[[wikilink]]` target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedLink {
    pub path: String,
    pub title: String,
    /// Leading characters of the matching passage.
    pub reason: String,
    pub score: f32,
}

impl From<&EvidenceItem> for SuggestedLink {
    fn from(item: &EvidenceItem) -> Self {
        Self {
            path: item.document_id.clone(),
            title: item.title.clone(),
            reason: item.text.chars().take(LINK_REASON_CHARS).collect(),
            score: item.score,
        }
    }
}

pub struct NoteLinker<E, V> {
    retriever: Arc<EvidenceRetriever<E, V>>,
}

impl<E, V> NoteLinker<E, V>
where
    E: EmbeddingGateway,
    V: VectorDbClient,
{
    pub fn new(retriever: Arc<EvidenceRetriever<E, V>>) -> Self {
        Self { retriever }
    }

    /// Notes related to `note_text`, never including `note_id` itself.
    #[instrument(skip(self, note_text))]
    pub async fn find_links(
        &self,
        note_text: &str,
        note_id: &str,
        max_links: usize,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        if note_id.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest {
                reason: "note id is empty".to_string(),
            });
        }
        self.retriever
            .retrieve(note_text, max_links, Some(note_id))
            .await
    }
}

/// Renders link suggestions as text for the note author.
pub fn summarize_links(items: &[EvidenceItem]) -> String {
    if items.is_empty() {
        return "No related notes found for linking.".to_string();
    }

    let mut out = format!("Found {} related note(s) for linking:\n", items.len());
    for (n, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. [[{}]]", n + 1, item.title);
        let _ = writeln!(out, "\t- Path: {}", item.document_id);
        let _ = writeln!(out, "\t- Relevance: {:.4}", item.score);
        out.push('\n');
    }
    out.trim_end().to_string()
}
