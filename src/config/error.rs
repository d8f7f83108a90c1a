//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
///
/// All variants are fatal: they are surfaced immediately and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port value is outside valid range (1-65535).
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort { value: String },

    /// Port string could not be parsed as a number.
    #[error("failed to parse port '{value}': {source}")]
    PortParseError {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Bind address string could not be parsed.
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// A numeric environment variable could not be parsed.
    #[error("failed to parse {name}='{value}': {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A floating point environment variable could not be parsed.
    #[error("failed to parse {name}='{value}': {source}")]
    InvalidFloat {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// Chunk overlap must be strictly smaller than the chunk size.
    #[error("invalid chunking: overlap {chunk_overlap} must be smaller than size {chunk_size}")]
    InvalidChunking {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    /// Retrieval overfetch factor is too small to deduplicate by document.
    #[error("invalid overfetch factor {value}: must be at least {min}")]
    InvalidOverfetch { value: usize, min: usize },

    /// A setting that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },

    /// Specified path does not exist on the filesystem.
    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    /// Path exists but is not a directory (when a directory was expected).
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A corpus root other than the configured vault. Document ids are
    /// relative to the vault, so no other root may be indexed or reconciled.
    #[error("corpus root {path} is not the configured vault {vault}")]
    ForeignRoot { path: PathBuf, vault: PathBuf },
}
