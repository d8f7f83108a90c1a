//! Opponent library crate (used by the server and integration tests).
//!
//! Produces adversarial, evidence-grounded critiques of claims using passages
//! retrieved from a personal markdown vault, and suggests links between notes.
//!
//! # Public API Surface
//!
//! ## Pipeline
//! - [`CorpusIndexer`] - walk, fingerprint, chunk, embed and store a vault
//! - [`EvidenceRetriever`] - ranked, deduplicated passages for a claim
//! - [`NoteLinker`], [`summarize_links`] - related-note suggestions
//! - [`AdversarialReasoner`], [`Critique`] - grounded critiques
//! - [`OpponentService`] - the operations exposed over HTTP
//!
//! ## Collaborators
//! - [`Embedder`] / [`EmbeddingGateway`] - Ollama embeddings or a hashing stub
//! - [`QdrantClient`] / [`VectorDbClient`] - vector index
//! - [`GenaiModel`] / [`LanguageModel`] - chat model
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod chunking;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod gateway;
pub mod hashing;
pub mod indexer;
pub mod linking;
pub mod reasoning;
pub mod retrieval;
pub mod service;
pub mod vault;
pub mod vectordb;

pub use chunking::{Chunk, Chunker, chunk_text};
pub use config::{Config, ConfigError, GatewayTimeouts};
pub use embedding::{Embedder, EmbedderConfig, EmbeddingError, EmbeddingGateway};
pub use hashing::{chunk_point_id, fingerprint_document, hash_to_u64};
pub use indexer::{CorpusIndexer, IndexError, IndexReport, IndexerConfig, ReconcileReport};
pub use linking::{NoteLinker, SuggestedLink, summarize_links};
pub use reasoning::{
    AdversarialReasoner, Critique, GenaiModel, LanguageModel, ReasonerConfig, ReasoningError,
    Weakness, WeaknessBasis,
};
pub use retrieval::{EvidenceItem, EvidenceRetriever, RetrievalError, RetrieverConfig};
pub use service::OpponentService;
pub use vault::{Document, DocumentSource, MarkdownVault, VaultError};
pub use vectordb::{QdrantClient, SearchFilter, VectorDbClient, VectorDbError, VectorPoint};

#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbedder;
#[cfg(any(test, feature = "mock"))]
pub use reasoning::MockLanguageModel;
#[cfg(any(test, feature = "mock"))]
pub use vectordb::MockVectorDbClient;
