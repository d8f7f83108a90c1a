use std::collections::HashMap;

use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, PointId, ScoredPoint, Value};

use crate::chunking::Chunk;
use crate::hashing::chunk_point_id;

/// Payload keys stored alongside every vector.
pub mod fields {
    pub const DOCUMENT_ID: &str = "document_id";
    pub const TITLE: &str = "title";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const CHAR_START: &str = "char_start";
    pub const CHAR_END: &str = "char_end";
    pub const TEXT: &str = "text";
    pub const TAGS: &str = "tags";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const MODIFIED_AT: &str = "modified_at";
}

/// Provenance and text of one indexed chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkPayload {
    pub document_id: String,
    pub title: String,
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
    pub tags: Vec<String>,
    /// Fingerprint of the document version this chunk was cut from.
    pub fingerprint: String,
    /// Unix seconds of the source file's last modification.
    pub modified_at: Option<i64>,
}

impl ChunkPayload {
    /// Builds a payload from a chunk and its document metadata.
    pub fn from_chunk(
        chunk: &Chunk,
        title: &str,
        tags: &[String],
        fingerprint: &str,
        modified_at: Option<i64>,
    ) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            title: title.to_string(),
            chunk_index: chunk.index,
            char_start: chunk.char_start,
            char_end: chunk.char_end,
            text: chunk.text.clone(),
            tags: tags.to_vec(),
            fingerprint: fingerprint.to_string(),
            modified_at,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub(crate) fn into_qdrant(self) -> HashMap<String, Value> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(fields::DOCUMENT_ID.to_string(), self.document_id.into());
        payload.insert(fields::TITLE.to_string(), self.title.into());
        payload.insert(
            fields::CHUNK_INDEX.to_string(),
            (self.chunk_index as i64).into(),
        );
        payload.insert(
            fields::CHAR_START.to_string(),
            (self.char_start as i64).into(),
        );
        payload.insert(fields::CHAR_END.to_string(), (self.char_end as i64).into());
        payload.insert(fields::TEXT.to_string(), self.text.into());
        payload.insert(fields::TAGS.to_string(), string_list(self.tags));
        payload.insert(fields::FINGERPRINT.to_string(), self.fingerprint.into());
        if let Some(modified_at) = self.modified_at {
            payload.insert(fields::MODIFIED_AT.to_string(), modified_at.into());
        }
        payload
    }

    /// Reads a payload back; `None` if the record has no document id.
    pub(crate) fn from_qdrant(payload: &HashMap<String, Value>) -> Option<Self> {
        let string = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        let integer = |key: &str| payload.get(key).and_then(|v| v.as_integer());

        let document_id = string(fields::DOCUMENT_ID).filter(|id| !id.is_empty())?;

        let tags = match payload.get(fields::TAGS).and_then(|v| v.kind.as_ref()) {
            Some(Kind::ListValue(list)) => list
                .values
                .iter()
                .filter_map(|v| match &v.kind {
                    Some(Kind::StringValue(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            document_id,
            title: string(fields::TITLE).unwrap_or_default(),
            chunk_index: integer(fields::CHUNK_INDEX).unwrap_or(0) as usize,
            char_start: integer(fields::CHAR_START).unwrap_or(0) as usize,
            char_end: integer(fields::CHAR_END).unwrap_or(0) as usize,
            text: string(fields::TEXT).unwrap_or_default(),
            tags,
            fingerprint: string(fields::FINGERPRINT).unwrap_or_default(),
            modified_at: integer(fields::MODIFIED_AT),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl VectorPoint {
    /// Point id is derived from `(document_id, chunk_index)`.
    pub fn new(vector: Vec<f32>, payload: ChunkPayload) -> Self {
        Self {
            id: chunk_point_id(&payload.document_id, payload.chunk_index),
            vector,
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: u64,
    /// Cosine similarity between the query and the stored vector.
    pub score: f32,
    pub payload: ChunkPayload,
}

impl SearchResult {
    pub fn from_scored_point(point: ScoredPoint) -> Option<Self> {
        let id = numeric_id(point.id)?;
        let payload = ChunkPayload::from_qdrant(&point.payload)?;

        Some(SearchResult {
            id,
            score: point.score,
            payload,
        })
    }
}

fn string_list(values: Vec<String>) -> Value {
    Value {
        kind: Some(Kind::ListValue(ListValue {
            values: values.into_iter().map(Value::from).collect(),
        })),
    }
}

pub(crate) fn numeric_id(id: Option<PointId>) -> Option<u64> {
    match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Num(n)) => Some(n),
        _ => None,
    }
}

/// Metadata filter applied to similarity queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Skip every record of these documents.
    pub exclude_document_ids: Vec<String>,
    /// Only records whose document carries this tag.
    pub require_tag: Option<String>,
}

impl SearchFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn excluding(document_id: impl Into<String>) -> Self {
        Self {
            exclude_document_ids: vec![document_id.into()],
            require_tag: None,
        }
    }

    /// Adds a document to the exclusion list. Duplicates are ignored.
    pub fn exclude(&mut self, document_id: impl Into<String>) {
        let document_id = document_id.into();
        if !self.exclude_document_ids.contains(&document_id) {
            self.exclude_document_ids.push(document_id);
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.require_tag = Some(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exclude_document_ids.is_empty() && self.require_tag.is_none()
    }

    /// Returns `true` if a payload passes this filter.
    pub fn accepts(&self, payload: &ChunkPayload) -> bool {
        if self
            .exclude_document_ids
            .iter()
            .any(|excluded| *excluded == payload.document_id)
        {
            return false;
        }
        match &self.require_tag {
            Some(tag) => payload.has_tag(tag),
            None => true,
        }
    }
}
