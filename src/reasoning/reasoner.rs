use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::error::ReasoningError;
use super::llm::{Conversation, LanguageModel};
use super::parser::{Citation, ParsedCritique, parse_critique};
use super::protocol::{self, NO_EVIDENCE_NOTICE};
use crate::config::Config;
use crate::embedding::EmbeddingGateway;
use crate::retrieval::{EvidenceItem, EvidenceRetriever};
use crate::vectordb::VectorDbClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaknessBasis {
    /// Backed by at least one evidence item.
    Evidence,
    /// Backed by reasoning alone (`[LOGIC]`).
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weakness {
    pub statement: String,
    pub basis: WeaknessBasis,
    /// 1-based positions in [`Critique::evidence`].
    pub citations: Vec<usize>,
}

/// A grounded critique of one claim.
///
/// Every entry of `citations` and `evidence_used` is a valid 1-based position
/// in `evidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub summary: String,
    pub weaknesses: Vec<Weakness>,
    pub evidence: Vec<EvidenceItem>,
    pub evidence_used: Vec<usize>,
    pub evidence_count: usize,
    /// Weaknesses discarded because they cited evidence that was not supplied.
    pub dropped_weaknesses: usize,
}

#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    pub generation_timeout: Duration,
    /// When set, notes carrying this tag are searched in addition to the
    /// whole corpus.
    pub evidence_tag: Option<String>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReasonerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generation_timeout: config.timeouts.generation,
            evidence_tag: config.evidence_tag.clone(),
        }
    }
}

pub struct AdversarialReasoner<E, V, L> {
    retriever: Arc<EvidenceRetriever<E, V>>,
    model: Arc<L>,
    config: ReasonerConfig,
}

impl<E, V, L> AdversarialReasoner<E, V, L>
where
    E: EmbeddingGateway,
    V: VectorDbClient,
    L: LanguageModel,
{
    pub fn new(retriever: Arc<EvidenceRetriever<E, V>>, model: Arc<L>, config: ReasonerConfig) -> Self {
        Self {
            retriever,
            model,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Critiques `claim_text` using at most `max_evidence` corpus passages.
    pub async fn challenge(
        &self,
        claim_text: &str,
        context: Option<&str>,
        max_evidence: usize,
    ) -> Result<Critique, ReasoningError> {
        self.challenge_excluding(claim_text, context, max_evidence, None)
            .await
    }

    /// Like [`challenge`](Self::challenge), never drawing evidence from
    /// `exclude_document_id` (usually the note containing the claim).
    #[instrument(skip(self, claim_text, context), fields(model = %self.model.model_name()))]
    pub async fn challenge_excluding(
        &self,
        claim_text: &str,
        context: Option<&str>,
        max_evidence: usize,
        exclude_document_id: Option<&str>,
    ) -> Result<Critique, ReasoningError> {
        if claim_text.trim().is_empty() {
            return Err(ReasoningError::InvalidRequest {
                reason: "claim text is empty".to_string(),
            });
        }
        if max_evidence == 0 {
            return Err(ReasoningError::InvalidRequest {
                reason: "max_evidence must be at least 1".to_string(),
            });
        }

        let evidence = self
            .retriever
            .retrieve_for_opposition(
                claim_text,
                max_evidence,
                exclude_document_id,
                self.config.evidence_tag.as_deref(),
            )
            .await?;
        debug!(evidence = evidence.len(), "Evidence gathered");

        let conversation = protocol::compose(claim_text, context, &evidence);
        let parsed = self.generate_parsed(&conversation).await?;
        let critique = ground(parsed, evidence);

        info!(
            weaknesses = critique.weaknesses.len(),
            dropped = critique.dropped_weaknesses,
            evidence = critique.evidence_count,
            "Critique produced"
        );
        Ok(critique)
    }

    /// Generates and parses, asking once for a reformat if parsing fails.
    async fn generate_parsed(
        &self,
        conversation: &Conversation,
    ) -> Result<ParsedCritique, ReasoningError> {
        let first = self.generate(conversation).await?;
        let problem = match parse_critique(&first) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => e,
        };

        warn!(error = %problem, "Model output rejected, requesting reformat");
        let retry = protocol::reformat(conversation, &first, &problem.to_string());
        let second = self.generate(&retry).await?;

        parse_critique(&second).map_err(|e| ReasoningError::Format {
            reason: e.to_string(),
        })
    }

    async fn generate(&self, conversation: &Conversation) -> Result<String, ReasoningError> {
        let timeout = self.config.generation_timeout;
        match tokio::time::timeout(timeout, self.model.complete(conversation)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ReasoningError::GatewayTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Drops weaknesses that cite evidence outside `1..=evidence.len()` and
/// filters `evidence_used` the same way.
pub fn ground(parsed: ParsedCritique, evidence: Vec<EvidenceItem>) -> Critique {
    let n = evidence.len();
    let in_range = |i: usize| (1..=n).contains(&i);

    let mut weaknesses = Vec::with_capacity(parsed.weaknesses.len());
    let mut dropped = 0;
    for weakness in parsed.weaknesses {
        let mut citations = Vec::new();
        let mut grounded = true;
        for citation in &weakness.citations {
            if let Citation::Evidence(i) = *citation {
                grounded &= in_range(i);
                citations.push(i);
            }
        }

        if !grounded {
            debug!(statement = %weakness.statement, "Dropping weakness with unknown citation");
            dropped += 1;
            continue;
        }

        let basis = if citations.is_empty() {
            WeaknessBasis::Structural
        } else {
            WeaknessBasis::Evidence
        };
        weaknesses.push(Weakness {
            statement: weakness.statement,
            basis,
            citations,
        });
    }

    let mut evidence_used: Vec<usize> = parsed
        .evidence_used
        .into_iter()
        .filter(|&i| in_range(i))
        .collect();
    for weakness in &weaknesses {
        for &i in &weakness.citations {
            if !evidence_used.contains(&i) {
                evidence_used.push(i);
            }
        }
    }
    evidence_used.sort_unstable();

    let summary = if n == 0 && !parsed.summary.starts_with(NO_EVIDENCE_NOTICE) {
        format!("{NO_EVIDENCE_NOTICE} {}", parsed.summary)
    } else {
        parsed.summary
    };

    Critique {
        summary,
        weaknesses,
        evidence_count: n,
        evidence,
        evidence_used,
        dropped_weaknesses: dropped,
    }
}
