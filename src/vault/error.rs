use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The corpus root is missing or not a directory.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to walk '{path}': {message}")]
    Walk { path: PathBuf, message: String },

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is outside the vault root")]
    OutsideRoot { path: PathBuf },
}
