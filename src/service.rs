//! The operations exposed to clients, wired over shared components.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::{Config, validate_vault_root};
use crate::embedding::EmbeddingGateway;
use crate::indexer::{CorpusIndexer, IndexError, IndexReport, IndexerConfig, ReconcileReport};
use crate::linking::NoteLinker;
use crate::reasoning::{AdversarialReasoner, Critique, LanguageModel, ReasonerConfig, ReasoningError};
use crate::retrieval::{EvidenceItem, EvidenceRetriever, RetrievalError, RetrieverConfig};
use crate::vault::{DocumentSource, MarkdownVault, normalize_document_id};
use crate::vectordb::VectorDbClient;

pub struct OpponentService<E, V, L, D = MarkdownVault> {
    indexer: CorpusIndexer<E, V, D>,
    linker: NoteLinker<E, V>,
    reasoner: AdversarialReasoner<E, V, L>,
    vault_path: PathBuf,
    default_max_results: usize,
    ready: AtomicBool,
}

impl<E, V, L, D> OpponentService<E, V, L, D>
where
    E: EmbeddingGateway,
    V: VectorDbClient,
    L: LanguageModel,
    D: DocumentSource,
{
    pub fn new(
        embedder: Arc<E>,
        vectordb: Arc<V>,
        model: Arc<L>,
        source: Arc<D>,
        config: &Config,
    ) -> Result<Self, IndexError> {
        let indexer = CorpusIndexer::new(
            Arc::clone(&embedder),
            Arc::clone(&vectordb),
            source,
            IndexerConfig::from_config(config),
        )?;
        let retriever = Arc::new(EvidenceRetriever::new(
            embedder,
            vectordb,
            RetrieverConfig::from_config(config),
        ));

        Ok(Self {
            indexer,
            linker: NoteLinker::new(Arc::clone(&retriever)),
            reasoner: AdversarialReasoner::new(retriever, model, ReasonerConfig::from_config(config)),
            vault_path: config.vault_path.clone(),
            default_max_results: config.max_results,
            ready: AtomicBool::new(false),
        })
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    pub fn model_name(&self) -> &str {
        self.reasoner.model_name()
    }

    /// `true` once the collection is known to exist.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Creates the collection if needed.
    pub async fn initialize(&self) -> Result<(), IndexError> {
        self.indexer.ensure_collection().await?;
        self.ready.store(true, Ordering::Release);
        info!("Collection ready");
        Ok(())
    }

    /// Indexes `corpus_root`, which must be the configured vault.
    pub async fn index_corpus(&self, corpus_root: &Path) -> Result<IndexReport, IndexError> {
        validate_vault_root(corpus_root, &self.vault_path)?;
        let report = self.indexer.index(corpus_root).await?;
        self.ready.store(true, Ordering::Release);
        Ok(report)
    }

    /// Related notes for a note being edited. `note_id` may be vault-relative
    /// or an absolute path inside the vault.
    pub async fn find_links(
        &self,
        note_text: &str,
        note_id: &str,
        max_links: usize,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let note_id = normalize_document_id(&self.vault_path, note_id);
        self.linker.find_links(note_text, &note_id, max_links).await
    }

    pub async fn challenge(
        &self,
        claim_text: &str,
        context: Option<&str>,
        max_evidence: usize,
    ) -> Result<Critique, ReasoningError> {
        self.reasoner
            .challenge(claim_text, context, max_evidence)
            .await
    }

    /// Challenges a claim taken from `note_id`, drawing no evidence from that note.
    pub async fn challenge_note(
        &self,
        claim_text: &str,
        context: Option<&str>,
        max_evidence: usize,
        note_id: &str,
    ) -> Result<Critique, ReasoningError> {
        let note_id = normalize_document_id(&self.vault_path, note_id);
        self.reasoner
            .challenge_excluding(claim_text, context, max_evidence, Some(&note_id))
            .await
    }

    pub async fn remove_document(&self, document_id: &str) -> Result<bool, IndexError> {
        let document_id = normalize_document_id(&self.vault_path, document_id);
        self.indexer.remove_document(&document_id).await
    }

    /// Evicts indexed notes missing from `corpus_root`, which must be the
    /// configured vault.
    pub async fn reconcile(&self, corpus_root: &Path) -> Result<ReconcileReport, IndexError> {
        validate_vault_root(corpus_root, &self.vault_path)?;
        self.indexer.reconcile(corpus_root).await
    }
}
