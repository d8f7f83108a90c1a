//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `OPPONENT_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBED_RETRY_BACKOFF_MS,
    DEFAULT_EMBED_TIMEOUT_MS, DEFAULT_EMBEDDING_DIM, DEFAULT_GENERATION_TIMEOUT_MS,
    DEFAULT_INDEX_CONCURRENCY, DEFAULT_MAX_RESULTS, DEFAULT_OVERFETCH_FACTOR,
    DEFAULT_QUERY_TIMEOUT_MS, MIN_OVERFETCH_FACTOR,
};

/// Server configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `OPPONENT_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port. Default: `8000`.
    pub port: u16,

    /// IP address to bind to. Default: `127.0.0.1`.
    pub bind_addr: IpAddr,

    /// Root of the markdown vault. Default: `./vault`.
    pub vault_path: PathBuf,

    /// Qdrant endpoint URL. Default: `http://localhost:6334`.
    pub qdrant_url: String,

    /// Qdrant collection holding the corpus. Default: `obsidian_notes`.
    pub collection_name: String,

    /// Ollama base URL for embeddings. Default: `http://localhost:11434`.
    pub embedding_url: String,

    /// Embedding model name. Default: `nomic-embed-text`.
    pub embedding_model: String,

    /// Embedding dimension; must match the model. Default: `768`.
    pub embedding_dim: usize,

    /// Use the deterministic hashing embedder instead of a model.
    pub embedding_stub: bool,

    /// Chat model name, resolved by `genai`. Default: `phi3:3.8b`.
    pub llm_model: String,

    /// Sampling temperature for critiques. Default: `0.3`.
    pub llm_temperature: f64,

    /// Request a streamed response and accumulate it.
    pub llm_stream: bool,

    /// Characters per chunk. Default: `512`.
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks. Default: `50`.
    pub chunk_overlap: usize,

    /// Default number of evidence items / links. Default: `5`.
    pub max_results: usize,

    /// Candidates fetched per requested result. Default: `3`.
    pub overfetch_factor: usize,

    /// Documents indexed concurrently. Default: `4`.
    pub index_concurrency: usize,

    /// Notes carrying this tag are searched alongside the whole corpus when
    /// gathering challenge evidence. Default: `opponent`. An empty
    /// `OPPONENT_EVIDENCE_TAG` turns the tagged search off.
    pub evidence_tag: Option<String>,

    /// Index the vault before serving requests.
    pub index_on_startup: bool,

    /// Allowed CORS origins. Default: `http://localhost:5173`.
    pub cors_origins: Vec<String>,

    /// Per-call timeouts for external collaborators.
    pub timeouts: GatewayTimeouts,
}

/// Timeouts for each external call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    pub embedding: Duration,
    pub vector_query: Duration,
    pub generation: Duration,
    /// Pause before the single embedding retry.
    pub embed_retry_backoff: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            embedding: Duration::from_millis(DEFAULT_EMBED_TIMEOUT_MS),
            vector_query: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            generation: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            embed_retry_backoff: Duration::from_millis(DEFAULT_EMBED_RETRY_BACKOFF_MS),
        }
    }
}

/// Default Qdrant URL used when `OPPONENT_QDRANT_URL` is not set.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Default Ollama URL used when `OPPONENT_EMBEDDING_URL` is not set.
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434";

pub const DEFAULT_COLLECTION_NAME: &str = "obsidian_notes";

/// Tag marking notes written as counter-arguments.
pub const DEFAULT_EVIDENCE_TAG: &str = "opponent";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            vault_path: PathBuf::from("./vault"),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            embedding_stub: false,
            llm_model: "phi3:3.8b".to_string(),
            llm_temperature: 0.3,
            llm_stream: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_results: DEFAULT_MAX_RESULTS,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            index_concurrency: DEFAULT_INDEX_CONCURRENCY,
            evidence_tag: Some(DEFAULT_EVIDENCE_TAG.to_string()),
            index_on_startup: false,
            cors_origins: vec!["http://localhost:5173".to_string()],
            timeouts: GatewayTimeouts::default(),
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "OPPONENT_PORT";
    const ENV_BIND_ADDR: &'static str = "OPPONENT_BIND_ADDR";
    const ENV_VAULT_PATH: &'static str = "OPPONENT_VAULT_PATH";
    const ENV_QDRANT_URL: &'static str = "OPPONENT_QDRANT_URL";
    const ENV_COLLECTION: &'static str = "OPPONENT_COLLECTION";
    const ENV_EMBEDDING_URL: &'static str = "OPPONENT_EMBEDDING_URL";
    const ENV_EMBEDDING_MODEL: &'static str = "OPPONENT_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIM: &'static str = "OPPONENT_EMBEDDING_DIM";
    const ENV_EMBEDDING_STUB: &'static str = "OPPONENT_EMBEDDING_STUB";
    const ENV_LLM_MODEL: &'static str = "OPPONENT_LLM_MODEL";
    const ENV_LLM_TEMPERATURE: &'static str = "OPPONENT_LLM_TEMPERATURE";
    const ENV_LLM_STREAM: &'static str = "OPPONENT_LLM_STREAM";
    const ENV_CHUNK_SIZE: &'static str = "OPPONENT_CHUNK_SIZE";
    const ENV_CHUNK_OVERLAP: &'static str = "OPPONENT_CHUNK_OVERLAP";
    const ENV_MAX_RESULTS: &'static str = "OPPONENT_MAX_RESULTS";
    const ENV_OVERFETCH: &'static str = "OPPONENT_OVERFETCH_FACTOR";
    const ENV_INDEX_CONCURRENCY: &'static str = "OPPONENT_INDEX_CONCURRENCY";
    const ENV_EVIDENCE_TAG: &'static str = "OPPONENT_EVIDENCE_TAG";
    const ENV_INDEX_ON_STARTUP: &'static str = "OPPONENT_INDEX_ON_STARTUP";
    const ENV_CORS_ORIGINS: &'static str = "OPPONENT_CORS_ORIGINS";
    const ENV_EMBED_TIMEOUT_MS: &'static str = "OPPONENT_EMBED_TIMEOUT_MS";
    const ENV_QUERY_TIMEOUT_MS: &'static str = "OPPONENT_QUERY_TIMEOUT_MS";
    const ENV_GENERATION_TIMEOUT_MS: &'static str = "OPPONENT_GENERATION_TIMEOUT_MS";
    const ENV_EMBED_RETRY_BACKOFF_MS: &'static str = "OPPONENT_EMBED_RETRY_BACKOFF_MS";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let vault_path = Self::parse_path_from_env(Self::ENV_VAULT_PATH, defaults.vault_path);
        let qdrant_url = Self::parse_string_from_env(Self::ENV_QDRANT_URL, defaults.qdrant_url);
        let collection_name =
            Self::parse_string_from_env(Self::ENV_COLLECTION, defaults.collection_name);
        let embedding_url =
            Self::parse_string_from_env(Self::ENV_EMBEDDING_URL, defaults.embedding_url);
        let embedding_model =
            Self::parse_string_from_env(Self::ENV_EMBEDDING_MODEL, defaults.embedding_model);
        let embedding_dim =
            Self::parse_usize_from_env(Self::ENV_EMBEDDING_DIM, defaults.embedding_dim)?;
        let embedding_stub =
            Self::parse_bool_from_env(Self::ENV_EMBEDDING_STUB, defaults.embedding_stub);
        let llm_model = Self::parse_string_from_env(Self::ENV_LLM_MODEL, defaults.llm_model);
        let llm_temperature =
            Self::parse_f64_from_env(Self::ENV_LLM_TEMPERATURE, defaults.llm_temperature)?;
        let llm_stream = Self::parse_bool_from_env(Self::ENV_LLM_STREAM, defaults.llm_stream);
        let chunk_size = Self::parse_usize_from_env(Self::ENV_CHUNK_SIZE, defaults.chunk_size)?;
        let chunk_overlap =
            Self::parse_usize_from_env(Self::ENV_CHUNK_OVERLAP, defaults.chunk_overlap)?;
        let max_results = Self::parse_usize_from_env(Self::ENV_MAX_RESULTS, defaults.max_results)?;
        let overfetch_factor =
            Self::parse_usize_from_env(Self::ENV_OVERFETCH, defaults.overfetch_factor)?;
        let index_concurrency =
            Self::parse_usize_from_env(Self::ENV_INDEX_CONCURRENCY, defaults.index_concurrency)?;
        let evidence_tag =
            Self::parse_optional_string_from_env(Self::ENV_EVIDENCE_TAG, defaults.evidence_tag);
        let index_on_startup =
            Self::parse_bool_from_env(Self::ENV_INDEX_ON_STARTUP, defaults.index_on_startup);
        let cors_origins = Self::parse_list_from_env(Self::ENV_CORS_ORIGINS, defaults.cors_origins);

        let timeouts = GatewayTimeouts {
            embedding: Self::parse_millis_from_env(
                Self::ENV_EMBED_TIMEOUT_MS,
                defaults.timeouts.embedding,
            )?,
            vector_query: Self::parse_millis_from_env(
                Self::ENV_QUERY_TIMEOUT_MS,
                defaults.timeouts.vector_query,
            )?,
            generation: Self::parse_millis_from_env(
                Self::ENV_GENERATION_TIMEOUT_MS,
                defaults.timeouts.generation,
            )?,
            embed_retry_backoff: Self::parse_millis_from_env(
                Self::ENV_EMBED_RETRY_BACKOFF_MS,
                defaults.timeouts.embed_retry_backoff,
            )?,
        };

        Ok(Self {
            port,
            bind_addr,
            vault_path,
            qdrant_url,
            collection_name,
            embedding_url,
            embedding_model,
            embedding_dim,
            embedding_stub,
            llm_model,
            llm_temperature,
            llm_stream,
            chunk_size,
            chunk_overlap,
            max_results,
            overfetch_factor,
            index_concurrency,
            evidence_tag,
            index_on_startup,
            cors_origins,
            timeouts,
        })
    }

    /// Validates numeric invariants and the vault path (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;

        if self.overfetch_factor < MIN_OVERFETCH_FACTOR {
            return Err(ConfigError::InvalidOverfetch {
                value: self.overfetch_factor,
                min: MIN_OVERFETCH_FACTOR,
            });
        }

        if self.embedding_dim == 0 {
            return Err(ConfigError::ZeroValue {
                name: "embedding_dim",
            });
        }
        if self.max_results == 0 {
            return Err(ConfigError::ZeroValue {
                name: "max_results",
            });
        }
        if self.index_concurrency == 0 {
            return Err(ConfigError::ZeroValue {
                name: "index_concurrency",
            });
        }
        if self.timeouts.embedding.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "embedding timeout",
            });
        }
        if self.timeouts.vector_query.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "vector query timeout",
            });
        }
        if self.timeouts.generation.is_zero() {
            return Err(ConfigError::ZeroValue {
                name: "generation timeout",
            });
        }

        if self.vault_path.exists() && !self.vault_path.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.vault_path.clone(),
            });
        }

        Ok(())
    }

    /// Returns `"{bind_addr}:{port}"` (useful for logging/binding).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    /// Unset keeps `default`; set but blank disables the option.
    fn parse_optional_string_from_env(var_name: &str, default: Option<String>) -> Option<String> {
        match env::var(var_name) {
            Ok(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            Err(_) => default,
        }
    }

    fn parse_list_from_env(var_name: &str, default: Vec<String>) -> Vec<String> {
        match env::var(var_name) {
            Ok(value) => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => default,
        }
    }

    fn parse_bool_from_env(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .map(|s| {
                let s = s.trim().to_ascii_lowercase();
                s == "1" || s == "true" || s == "yes"
            })
            .unwrap_or(default)
    }

    fn parse_usize_from_env(var_name: &'static str, default: usize) -> Result<usize, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidNumber {
                    name: var_name,
                    value,
                    source: e,
                }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f64_from_env(var_name: &'static str, default: f64) -> Result<f64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidFloat {
                    name: var_name,
                    value,
                    source: e,
                }),
            Err(_) => Ok(default),
        }
    }

    fn parse_millis_from_env(
        var_name: &'static str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::InvalidNumber {
                    name: var_name,
                    value,
                    source: e,
                }),
            Err(_) => Ok(default),
        }
    }
}

/// Checks chunking parameters (`overlap < size`, `size > 0`).
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::ZeroValue { name: "chunk_size" });
    }
    if chunk_overlap >= chunk_size {
        return Err(ConfigError::InvalidChunking {
            chunk_size,
            chunk_overlap,
        });
    }
    Ok(())
}

/// Checks that a corpus root exists and is a directory.
/// Checks that `root` exists and resolves to the same directory as `vault`.
pub fn validate_vault_root(root: &Path, vault: &Path) -> Result<(), ConfigError> {
    validate_corpus_root(root)?;

    let resolved = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let expected = vault.canonicalize().unwrap_or_else(|_| vault.to_path_buf());
    if resolved != expected {
        return Err(ConfigError::ForeignRoot {
            path: root.to_path_buf(),
            vault: vault.to_path_buf(),
        });
    }
    Ok(())
}

pub fn validate_corpus_root(root: &Path) -> Result<(), ConfigError> {
    if !root.exists() {
        return Err(ConfigError::PathNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(ConfigError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}
