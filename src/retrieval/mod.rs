//! Evidence retrieval.
//!
//! A claim is embedded, the index is asked for `max_results * overfetch_factor`
//! nearest chunks (again, past the documents already seen, while a full page
//! covers too few documents), and [`select_evidence`] reduces those to at most
//! `max_results` items with one chunk per document where possible.

mod error;


pub use error::RetrievalError;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::{Config, GatewayTimeouts};
use crate::constants::MIN_OVERFETCH_FACTOR;
use crate::embedding::{EmbeddingGateway, embed_with_retry};
use crate::vectordb::{SearchFilter, SearchResult, VectorDbClient, VectorDbError};

/// A retrieved passage with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub document_id: String,
    pub title: String,
    pub chunk_index: usize,
    pub text: String,
    pub tags: Vec<String>,
    /// Cosine similarity to the query; higher is more relevant.
    pub score: f32,
    /// 1-based position within the response.
    pub rank: usize,
}

impl EvidenceItem {
    fn from_result(result: SearchResult) -> Self {
        let payload = result.payload;
        Self {
            document_id: payload.document_id,
            title: payload.title,
            chunk_index: payload.chunk_index,
            text: payload.text,
            tags: payload.tags,
            score: result.score,
            rank: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub collection: String,
    pub overfetch_factor: usize,
    pub timeouts: GatewayTimeouts,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RetrieverConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.collection_name.clone(),
            overfetch_factor: config.overfetch_factor,
            timeouts: config.timeouts,
        }
    }
}

pub struct EvidenceRetriever<E, V> {
    embedder: Arc<E>,
    vectordb: Arc<V>,
    config: RetrieverConfig,
}

impl<E, V> EvidenceRetriever<E, V>
where
    E: EmbeddingGateway,
    V: VectorDbClient,
{
    pub fn new(embedder: Arc<E>, vectordb: Arc<V>, config: RetrieverConfig) -> Self {
        Self {
            embedder,
            vectordb,
            config: RetrieverConfig {
                overfetch_factor: config.overfetch_factor.max(MIN_OVERFETCH_FACTOR),
                ..config
            },
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Returns up to `max_results` passages relevant to `claim_text`.
    ///
    /// Records of `exclude_document_id` never appear in the result.
    pub async fn retrieve(
        &self,
        claim_text: &str,
        max_results: usize,
        exclude_document_id: Option<&str>,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let filter = SearchFilter {
            exclude_document_ids: exclude_document_id.map(str::to_string).into_iter().collect(),
            require_tag: None,
        };
        self.retrieve_filtered(claim_text, max_results, filter)
            .await
    }

    /// Like [`retrieve`](Self::retrieve), restricted to documents tagged `tag`.
    pub async fn retrieve_tagged(
        &self,
        claim_text: &str,
        max_results: usize,
        exclude_document_id: Option<&str>,
        tag: &str,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let filter = SearchFilter {
            exclude_document_ids: exclude_document_id.map(str::to_string).into_iter().collect(),
            require_tag: Some(normalize_tag(tag)),
        };
        self.retrieve_filtered(claim_text, max_results, filter)
            .await
    }

    /// Evidence for opposing a claim.
    ///
    /// Runs a search restricted to notes tagged `tag` and an unrestricted
    /// search, merges both candidate pools and ranks them together. Tagged
    /// notes are therefore never crowded out of the pool by untagged ones, and
    /// untagged notes still count as evidence. Without a tag this is
    /// [`retrieve`](Self::retrieve).
    #[instrument(skip(self, claim_text), fields(claim_len = claim_text.len()))]
    pub async fn retrieve_for_opposition(
        &self,
        claim_text: &str,
        max_results: usize,
        exclude_document_id: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let Some(tag) = tag.map(normalize_tag).filter(|t| !t.is_empty()) else {
            return self
                .retrieve(claim_text, max_results, exclude_document_id)
                .await;
        };

        validate_request(claim_text, max_results)?;
        let query = self.embed_claim(claim_text).await?;

        let general = SearchFilter {
            exclude_document_ids: exclude_document_id.map(str::to_string).into_iter().collect(),
            require_tag: None,
        };
        let tagged = general.clone().with_tag(tag);

        let (mut candidates, tagged_candidates) = tokio::try_join!(
            self.gather(query.clone(), max_results, general.clone()),
            self.gather(query, max_results, tagged),
        )?;

        let mut seen: HashSet<u64> = candidates.iter().map(|c| c.id).collect();
        candidates.extend(
            tagged_candidates
                .into_iter()
                .filter(|c| seen.insert(c.id)),
        );

        let candidate_count = candidates.len();
        let evidence = select_evidence(candidates, max_results, &general);
        debug!(
            candidates = candidate_count,
            returned = evidence.len(),
            "Retrieved opposition evidence"
        );
        Ok(evidence)
    }

    #[instrument(skip(self, claim_text), fields(claim_len = claim_text.len()))]
    pub async fn retrieve_filtered(
        &self,
        claim_text: &str,
        max_results: usize,
        filter: SearchFilter,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        validate_request(claim_text, max_results)?;
        let query = self.embed_claim(claim_text).await?;

        let candidates = self.gather(query, max_results, filter.clone()).await?;

        let candidate_count = candidates.len();
        let evidence = select_evidence(candidates, max_results, &filter);
        debug!(
            candidates = candidate_count,
            returned = evidence.len(),
            "Retrieved evidence"
        );
        Ok(evidence)
    }

    async fn embed_claim(&self, claim_text: &str) -> Result<Vec<f32>, RetrievalError> {
        let query = embed_with_retry(
            self.embedder.as_ref(),
            claim_text,
            self.config.timeouts.embedding,
            self.config.timeouts.embed_retry_backoff,
        )
        .await?;
        Ok(query)
    }

    /// Collects candidates spanning at least `max_results` documents, or every
    /// document the index holds if there are fewer.
    ///
    /// Each pass asks for `max_results * overfetch_factor` chunks. When a full
    /// page covers too few documents, the next pass excludes the documents
    /// already seen so one long note cannot monopolise the pool.
    async fn gather(
        &self,
        query: Vec<f32>,
        max_results: usize,
        mut filter: SearchFilter,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let limit = max_results.saturating_mul(self.config.overfetch_factor) as u64;
        let mut candidates = Vec::new();
        let mut documents = HashSet::new();

        loop {
            let batch = self.search_once(query.clone(), limit, filter.clone()).await?;
            let page_full = batch.len() as u64 >= limit;
            let before = documents.len();
            documents.extend(batch.iter().map(|c| c.payload.document_id.clone()));
            candidates.extend(batch);

            if documents.len() >= max_results || !page_full || documents.len() == before {
                break;
            }
            debug!(
                documents = documents.len(),
                wanted = max_results,
                "Page filled by few documents, searching past them"
            );
            for document_id in &documents {
                filter.exclude(document_id.clone());
            }
        }

        Ok(candidates)
    }

    async fn search_once(
        &self,
        query: Vec<f32>,
        limit: u64,
        filter: SearchFilter,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let timeout = self.config.timeouts.vector_query;
        let search = self
            .vectordb
            .search(&self.config.collection, query, limit, filter);

        match tokio::time::timeout(timeout, search).await {
            Err(_) => Err(RetrievalError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(VectorDbError::CollectionNotFound { collection })) => {
                debug!(collection = %collection, "Collection missing, treating corpus as empty");
                Ok(Vec::new())
            }
            Ok(result) => Ok(result?),
        }
    }
}

fn validate_request(claim_text: &str, max_results: usize) -> Result<(), RetrievalError> {
    if claim_text.trim().is_empty() {
        return Err(RetrievalError::InvalidRequest {
            reason: "claim text is empty".to_string(),
        });
    }
    if max_results == 0 {
        return Err(RetrievalError::InvalidRequest {
            reason: "max_results must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Descending score, then earlier chunk, then document id.
fn ranking_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.payload.chunk_index.cmp(&b.payload.chunk_index))
        .then_with(|| a.payload.document_id.cmp(&b.payload.document_id))
}

/// Reduces raw candidates to at most `max_results` ranked evidence items.
///
/// Candidates rejected by `filter` are dropped. The best chunk of each
/// document is taken first; if that yields fewer than `max_results` items the
/// remaining chunks fill the quota in ranking order.
pub fn select_evidence(
    mut candidates: Vec<SearchResult>,
    max_results: usize,
    filter: &SearchFilter,
) -> Vec<EvidenceItem> {
    candidates.retain(|c| filter.accepts(&c.payload));
    candidates.sort_by(ranking_order);

    let mut seen = HashSet::new();
    let (primary, rest): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| seen.insert(c.payload.document_id.clone()));

    let mut selected: Vec<SearchResult> = primary.into_iter().take(max_results).collect();
    let shortfall = max_results - selected.len();
    selected.extend(rest.into_iter().take(shortfall));
    selected.sort_by(ranking_order);

    selected
        .into_iter()
        .enumerate()
        .map(|(i, result)| EvidenceItem {
            rank: i + 1,
            ..EvidenceItem::from_result(result)
        })
        .collect()
}
