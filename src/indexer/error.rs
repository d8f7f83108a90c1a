use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::vault::VaultError;
use crate::vectordb::VectorDbError;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad corpus root or chunking parameters. Never retried.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vault(VaultError),

    #[error("failed to embed chunk {chunk_index} of '{document_id}': {source}")]
    Embedding {
        document_id: String,
        chunk_index: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error(transparent)]
    VectorDb(#[from] VectorDbError),

    #[error("indexing task failed: {message}")]
    Task { message: String },
}

impl From<VaultError> for IndexError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Config(e) => IndexError::Config(e),
            other => IndexError::Vault(other),
        }
    }
}
