//! Corpus indexing.
//!
//! [`CorpusIndexer`] keeps the vector index in step with the vault: unchanged
//! documents are skipped by fingerprint, changed ones have every old record
//! replaced, and removed ones are evicted explicitly or by [`CorpusIndexer::reconcile`].

mod error;
mod locks;


pub use error::IndexError;
pub use locks::DocumentLocks;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::chunking::Chunker;
use crate::config::{Config, GatewayTimeouts};
use crate::embedding::{EmbeddingGateway, embed_with_retry};
use crate::vault::{Document, DocumentSource, MarkdownVault, VaultScan, document_id_for};
use crate::vectordb::{ChunkPayload, VectorDbClient, VectorPoint};

/// Outcome of an indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents whose records were (re)written in this pass.
    pub documents_indexed: usize,
    /// Documents skipped because their fingerprint was already indexed.
    pub documents_unchanged: usize,
    /// Documents that could not be read, embedded or stored.
    pub documents_failed: usize,
    /// Records written in this pass.
    pub chunks_written: usize,
}

/// Outcome of [`CorpusIndexer::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub documents_removed: Vec<String>,
}

/// Result of indexing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { chunks: usize },
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Documents processed at once.
    pub concurrency: usize,
    pub timeouts: GatewayTimeouts,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IndexerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.collection_name.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            concurrency: config.index_concurrency,
            timeouts: config.timeouts,
        }
    }
}

/// Walks, chunks, embeds and stores a corpus.
pub struct CorpusIndexer<E, V, D = MarkdownVault> {
    embedder: Arc<E>,
    vectordb: Arc<V>,
    source: Arc<D>,
    chunker: Chunker,
    config: IndexerConfig,
    locks: DocumentLocks,
}

impl<E, V, D> CorpusIndexer<E, V, D>
where
    E: EmbeddingGateway,
    V: VectorDbClient,
    D: DocumentSource,
{
    /// Fails if the chunking parameters are invalid.
    pub fn new(
        embedder: Arc<E>,
        vectordb: Arc<V>,
        source: Arc<D>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            embedder,
            vectordb,
            source,
            chunker,
            config: IndexerConfig {
                concurrency: config.concurrency.max(1),
                ..config
            },
            locks: DocumentLocks::new(),
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Creates the collection for the embedder's dimension if needed.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        self.vectordb
            .ensure_collection(
                &self.config.collection,
                self.embedder.embedding_dim() as u64,
            )
            .await?;
        Ok(())
    }

    /// Indexes every document under `corpus_root`.
    ///
    /// Per-document failures are logged and counted; only an unusable root or
    /// collection aborts the pass.
    #[instrument(skip(self), fields(root = %corpus_root.display()))]
    pub async fn index(&self, corpus_root: &Path) -> Result<IndexReport, IndexError> {
        let scan = self.scan(corpus_root).await?;
        self.ensure_collection().await?;

        let mut report = IndexReport {
            documents_failed: scan.unreadable.len(),
            ..Default::default()
        };

        let outcomes: Vec<_> = stream::iter(scan.documents)
            .map(|document| async move {
                let outcome = self.index_document(&document).await;
                (document.id, outcome)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for (document_id, outcome) in outcomes {
            match outcome {
                Ok(IndexOutcome::Indexed { chunks }) => {
                    report.documents_indexed += 1;
                    report.chunks_written += chunks;
                }
                Ok(IndexOutcome::Unchanged) => report.documents_unchanged += 1,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Failed to index document");
                    report.documents_failed += 1;
                }
            }
        }

        info!(
            indexed = report.documents_indexed,
            unchanged = report.documents_unchanged,
            failed = report.documents_failed,
            chunks = report.chunks_written,
            "Indexing pass complete"
        );

        Ok(report)
    }

    /// Indexes one document unless its current fingerprint is already stored.
    ///
    /// New vectors are computed before the old records are deleted, so a
    /// failure leaves the previous version searchable.
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn index_document(&self, document: &Document) -> Result<IndexOutcome, IndexError> {
        let collection = &self.config.collection;
        let fingerprint =
            document.fingerprint(self.chunker.chunk_size(), self.chunker.chunk_overlap());

        let _guard = self.locks.lock(&document.id).await;

        let stored = self
            .vectordb
            .document_fingerprint(collection, &document.id)
            .await?;
        if stored.as_deref() == Some(fingerprint.as_str()) {
            debug!("Fingerprint unchanged, skipping");
            return Ok(IndexOutcome::Unchanged);
        }

        let chunks = self.chunker.chunk(&document.id, &document.body);
        if chunks.is_empty() && stored.is_none() {
            return Ok(IndexOutcome::Unchanged);
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = embed_with_retry(
                self.embedder.as_ref(),
                &chunk.text,
                self.config.timeouts.embedding,
                self.config.timeouts.embed_retry_backoff,
            )
            .await
            .map_err(|source| IndexError::Embedding {
                document_id: document.id.clone(),
                chunk_index: chunk.index,
                source,
            })?;

            let payload = ChunkPayload::from_chunk(
                chunk,
                &document.title,
                &document.tags,
                &fingerprint,
                document.modified_unix(),
            );
            points.push(VectorPoint::new(vector, payload));
        }

        self.vectordb
            .delete_document(collection, &document.id)
            .await?;
        self.vectordb
            .upsert_points(collection, points)
            .await?;

        debug!(chunks = chunks.len(), "Document indexed");
        Ok(IndexOutcome::Indexed {
            chunks: chunks.len(),
        })
    }

    /// Deletes every record of `document_id`. Returns `false` if none existed.
    #[instrument(skip(self))]
    pub async fn remove_document(&self, document_id: &str) -> Result<bool, IndexError> {
        let collection = &self.config.collection;
        let _guard = self.locks.lock(document_id).await;

        let existing = self
            .vectordb
            .count_document_points(collection, document_id)
            .await?;
        if existing == 0 {
            return Ok(false);
        }

        self.vectordb
            .delete_document(collection, document_id)
            .await?;
        info!(records = existing, "Removed document from index");
        Ok(true)
    }

    /// Evicts records whose document no longer exists under `corpus_root`.
    ///
    /// Files that exist but could not be read are kept.
    #[instrument(skip(self), fields(root = %corpus_root.display()))]
    pub async fn reconcile(&self, corpus_root: &Path) -> Result<ReconcileReport, IndexError> {
        let scan = self.scan(corpus_root).await?;

        let mut present: BTreeSet<String> = scan.documents.into_iter().map(|d| d.id).collect();
        present.extend(
            scan.unreadable
                .iter()
                .filter_map(|path| document_id_for(corpus_root, path).ok()),
        );

        let indexed = self
            .vectordb
            .list_document_ids(&self.config.collection)
            .await?;

        let mut report = ReconcileReport::default();
        for document_id in indexed.into_iter().filter(|id| !present.contains(id)) {
            if self.remove_document(&document_id).await? {
                report.documents_removed.push(document_id);
            }
        }

        info!(
            removed = report.documents_removed.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    async fn scan(&self, corpus_root: &Path) -> Result<VaultScan, IndexError> {
        let source = Arc::clone(&self.source);
        let root: PathBuf = corpus_root.to_path_buf();

        let scan = tokio::task::spawn_blocking(move || source.scan(&root))
            .await
            .map_err(|e| IndexError::Task {
                message: e.to_string(),
            })??;
        Ok(scan)
    }
}
