use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::GatewayError;
use crate::constants::{MAX_EVIDENCE_LIMIT, MAX_LINKS_LIMIT, MIN_NOTE_CHARS};
use crate::linking::SuggestedLink;

/// Body of `/api/vault/index` and `/api/vault/reconcile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultRequest {
    /// Overrides the configured vault root.
    pub vault_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub document_id: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub note_path: String,
    pub note_content: String,
    #[serde(default)]
    pub max_links: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub note_path: String,
    pub suggested_links: Vec<SuggestedLink>,
    pub summary: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub note_content: String,
    /// Note the claim comes from; its own passages are never used as evidence.
    #[serde(default)]
    pub note_path: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub max_evidence: Option<usize>,
}

fn check_content(content: &str) -> Result<(), GatewayError> {
    if content.trim().chars().count() < MIN_NOTE_CHARS {
        return Err(GatewayError::InvalidRequest(format!(
            "note_content must be at least {MIN_NOTE_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_limit(name: &str, value: usize, max: usize) -> Result<usize, GatewayError> {
    if !(1..=max).contains(&value) {
        return Err(GatewayError::InvalidRequest(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(value)
}

impl LinkRequest {
    /// Validates the request and resolves `max_links`.
    pub fn validate(&self, default_max: usize) -> Result<usize, GatewayError> {
        if self.note_path.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "note_path must not be empty".to_string(),
            ));
        }
        check_content(&self.note_content)?;
        let max_links = self.max_links.unwrap_or(default_max.min(MAX_LINKS_LIMIT));
        check_limit("max_links", max_links, MAX_LINKS_LIMIT)
    }
}

impl ChallengeRequest {
    /// Validates the request and resolves `max_evidence`.
    pub fn validate(&self, default_max: usize) -> Result<usize, GatewayError> {
        check_content(&self.note_content)?;
        let max_evidence = self
            .max_evidence
            .unwrap_or(default_max.min(MAX_EVIDENCE_LIMIT));
        check_limit("max_evidence", max_evidence, MAX_EVIDENCE_LIMIT)
    }

    pub fn note_path(&self) -> Option<&str> {
        self.note_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}
