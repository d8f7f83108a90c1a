//! Prompt protocol shared by the prompt builder and the output parser.

use std::fmt::Write as _;

use super::llm::Conversation;
use crate::retrieval::EvidenceItem;

pub const SUMMARY_HEADER: &str = "### SUMMARY";
pub const WEAKNESSES_HEADER: &str = "### WEAKNESSES";
pub const EVIDENCE_USED_HEADER: &str = "### EVIDENCE USED";

/// Citation for a weakness that rests on reasoning alone.
pub const LOGIC_TAG: &str = "LOGIC";

/// Prefix of the summary when the corpus yielded nothing relevant.
pub const NO_EVIDENCE_NOTICE: &str =
    "No corroborating or contradicting material was found in the corpus.";

pub const SYSTEM_PROTOCOL: &str = "\
You are an adversarial reviewer. Your job is to find the weaknesses in a claim \
so that its author can strengthen it. Be rigorous, not hostile.

Rules:
1. Every weakness must cite at least one evidence tag such as [E1] or [E2], \
or the tag [LOGIC] when the weakness is a purely structural flaw in the \
reasoning, such as an unstated assumption or an overgeneralisation.
2. Use nothing except the numbered evidence and pure logic. Do not rely on \
outside knowledge, and do not cite tags that were not provided.
3. Reply with exactly these three sections, in this order, and nothing else:

### SUMMARY
Two or three sentences summarising the opposition.

### WEAKNESSES
- [E1] One weakness per bullet, citing its evidence.
- [LOGIC] A structural weakness.

### EVIDENCE USED
- [E1]

Write \"None\" under a section that has no entries.";

pub const REFORMAT_INSTRUCTION: &str = "\
Your previous reply did not follow the required format. Rewrite it using \
exactly the three sections ### SUMMARY, ### WEAKNESSES and ### EVIDENCE USED, \
in that order. Every weakness must be a bullet starting with its citation \
tags, for example \"- [E2] ...\" or \"- [LOGIC] ...\". Do not add any text \
outside the sections.";

/// The citation tag for the `n`th (1-based) evidence item, without brackets.
pub fn evidence_tag(n: usize) -> String {
    format!("E{n}")
}

/// Builds the first-attempt conversation for a claim.
pub fn compose(claim: &str, context: Option<&str>, evidence: &[EvidenceItem]) -> Conversation {
    Conversation::new(SYSTEM_PROTOCOL).user(render_request(claim, context, evidence))
}

/// Extends `conversation` with the rejected output and a request to reformat it.
pub fn reformat(conversation: &Conversation, rejected_output: &str, problem: &str) -> Conversation {
    conversation
        .clone()
        .assistant(rejected_output)
        .user(format!("{REFORMAT_INSTRUCTION}\nProblem: {problem}"))
}

fn render_request(claim: &str, context: Option<&str>, evidence: &[EvidenceItem]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CLAIM:\n{}\n", claim.trim());

    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "CONTEXT:\n{context}\n");
    }

    out.push_str("EVIDENCE:\n");
    if evidence.is_empty() {
        out.push_str(
            "(none) The corpus holds nothing relevant. Only [LOGIC] weaknesses are possible.\n",
        );
    }
    for (i, item) in evidence.iter().enumerate() {
        let _ = write!(
            out,
            "[{}] {} ({})",
            evidence_tag(i + 1),
            item.title,
            item.document_id
        );
        if !item.tags.is_empty() {
            let _ = write!(out, " tags: {}", item.tags.join(", "));
        }
        let _ = writeln!(out, "\n{}\n", item.text.trim());
    }

    out.push_str("\nChallenge the claim.");
    out
}
