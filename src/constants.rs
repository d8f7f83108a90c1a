//! Cross-cutting, shared constants.
//!
//!
//! The embedding dimension is fixed for the lifetime of a collection; the
//! embedder output and the index upsert both check it.

/// Output size of `nomic-embed-text`, the default Ollama embedding model.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Characters shared between neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Candidates fetched per requested result before deduplication.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;

/// Overfetch below this starves deduplication.
pub const MIN_OVERFETCH_FACTOR: usize = 2;

pub const MAX_LINKS_LIMIT: usize = 20;

pub const MAX_EVIDENCE_LIMIT: usize = 10;

/// Characters of a linked passage shown as the reason for a link.
pub const LINK_REASON_CHARS: usize = 200;

/// Shortest note or claim accepted over HTTP.
pub const MIN_NOTE_CHARS: usize = 10;

pub const DEFAULT_EMBED_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_EMBED_RETRY_BACKOFF_MS: u64 = 250;

pub const DEFAULT_INDEX_CONCURRENCY: usize = 4;
