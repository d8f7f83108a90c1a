//! Qdrant vector database integration.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;


pub use client::{QdrantClient, VectorDbClient};
pub use error::VectorDbError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockVectorDbClient, cosine_similarity};
pub use model::{ChunkPayload, SearchFilter, SearchResult, VectorPoint};

pub use crate::config::DEFAULT_COLLECTION_NAME;
