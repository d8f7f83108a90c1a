//! Strict parser for critique-formatted model output.
//!
//! The output must contain the three protocol sections exactly once and in
//! order. Text before the first section is ignored. Each weakness must carry
//! at least one citation tag.

use thiserror::Error;

use super::protocol::LOGIC_TAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Citation {
    /// 1-based evidence index, as written by the model. May be out of range.
    Evidence(usize),
    Logic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedWeakness {
    pub statement: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCritique {
    pub summary: String,
    pub weaknesses: Vec<ParsedWeakness>,
    pub evidence_used: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing section '{0}'")]
    MissingSection(&'static str),

    #[error("section '{0}' appears more than once")]
    DuplicateSection(&'static str),

    #[error("sections are not in SUMMARY, WEAKNESSES, EVIDENCE USED order")]
    OutOfOrder,

    #[error("summary is empty")]
    EmptySummary,

    #[error("weakness has no statement")]
    EmptyWeakness,

    #[error("weakness cites no evidence tag or [LOGIC]: '{0}'")]
    UncitedWeakness(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Weaknesses,
    EvidenceUsed,
}

impl Section {
    const ORDER: [Section; 3] = [Section::Summary, Section::Weaknesses, Section::EvidenceUsed];

    fn name(self) -> &'static str {
        match self {
            Section::Summary => "SUMMARY",
            Section::Weaknesses => "WEAKNESSES",
            Section::EvidenceUsed => "EVIDENCE USED",
        }
    }
}

/// Recognises a protocol heading written as `##`-`####`, tolerating bold
/// markers and a trailing colon. Any other heading is ordinary text.
fn header(line: &str) -> Option<Section> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if !(2..=4).contains(&hashes) {
        return None;
    }

    let title = line[hashes..]
        .trim()
        .trim_matches('*')
        .trim_end_matches(':')
        .trim()
        .to_uppercase();

    Section::ORDER.into_iter().find(|s| s.name() == title)
}

fn is_none_marker(body: &str) -> bool {
    matches!(
        body.trim().trim_end_matches('.').to_lowercase().as_str(),
        "" | "none" | "n/a" | "- none"
    )
}

/// Splits `text` into the three section bodies.
fn split_sections(text: &str) -> Result<[String; 3], ParseError> {
    let mut bodies: [Option<Vec<&str>>; 3] = [None, None, None];
    let mut seen: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }

        match header(trimmed) {
            Some(section) => {
                if seen.contains(&section) {
                    return Err(ParseError::DuplicateSection(section.name()));
                }
                seen.push(section);
                let slot = section as usize;
                bodies[slot] = Some(Vec::new());
                current = Some(slot);
            }
            None => {
                if let Some(slot) = current
                    && let Some(body) = bodies[slot].as_mut()
                {
                    body.push(line);
                }
            }
        }
    }

    for section in Section::ORDER {
        if !seen.contains(&section) {
            return Err(ParseError::MissingSection(section.name()));
        }
    }
    if seen != Section::ORDER {
        return Err(ParseError::OutOfOrder);
    }

    Ok(bodies.map(|b| b.unwrap_or_default().join("\n")))
}

fn parse_citation_token(token: &str) -> Option<Citation> {
    let token = token.trim();
    if token.eq_ignore_ascii_case(LOGIC_TAG) {
        return Some(Citation::Logic);
    }
    let digits = token.strip_prefix(['E', 'e'])?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(Citation::Evidence)
}

/// Parses a bracket group such as `E1`, `E1, E3` or `LOGIC`.
/// Returns `None` unless every entry is a citation.
fn parse_citation_group(inner: &str) -> Option<Vec<Citation>> {
    let tokens: Vec<&str> = inner
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.into_iter().map(parse_citation_token).collect()
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Separates citation groups from the prose of one weakness.
fn parse_weakness(raw: &str) -> Result<ParsedWeakness, ParseError> {
    let mut citations = Vec::new();
    let mut statement = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find('[') {
        statement.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) => {
                let inner = &after[..close];
                match parse_citation_group(inner) {
                    Some(group) => {
                        for citation in group {
                            push_unique(&mut citations, citation);
                        }
                        statement.push(' ');
                    }
                    None => {
                        statement.push('[');
                        statement.push_str(inner);
                        statement.push(']');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                statement.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    statement.push_str(rest);

    let statement = statement
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches([':', '-', '*'])
        .trim()
        .to_string();

    if statement.is_empty() {
        return Err(ParseError::EmptyWeakness);
    }
    if citations.is_empty() {
        return Err(ParseError::UncitedWeakness(statement));
    }
    Ok(ParsedWeakness {
        statement,
        citations,
    })
}

/// Strips a list marker (`-`, `*`, `•`, `1.`, `1)`) and reports whether one was present.
fn strip_bullet(line: &str) -> (bool, &str) {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return (true, rest);
        }
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return (true, rest);
        }
    }
    (false, line)
}

fn parse_weaknesses(body: &str) -> Result<Vec<ParsedWeakness>, ParseError> {
    if is_none_marker(body) {
        return Ok(Vec::new());
    }

    let mut items: Vec<String> = Vec::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (bullet, text) = strip_bullet(line);
        match items.last_mut() {
            Some(last) if !bullet => {
                last.push(' ');
                last.push_str(text);
            }
            _ => items.push(text.to_string()),
        }
    }

    items.iter().map(|item| parse_weakness(item)).collect()
}

fn parse_evidence_used(body: &str) -> Vec<usize> {
    if is_none_marker(body) {
        return Vec::new();
    }

    let mut used = Vec::new();
    for token in body.split(|c: char| !c.is_ascii_alphanumeric()) {
        if let Some(Citation::Evidence(n)) = parse_citation_token(token) {
            push_unique(&mut used, n);
        }
    }
    used
}

/// Parses one model reply.
pub fn parse_critique(text: &str) -> Result<ParsedCritique, ParseError> {
    let [summary, weaknesses, evidence_used] = split_sections(text)?;

    let summary = summary
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if is_none_marker(&summary) {
        return Err(ParseError::EmptySummary);
    }

    Ok(ParsedCritique {
        summary,
        weaknesses: parse_weaknesses(&weaknesses)?,
        evidence_used: parse_evidence_used(&evidence_used),
    })
}
