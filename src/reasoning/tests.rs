use std::sync::Arc;
use std::time::Duration;

use super::parser::{ParsedCritique, ParsedWeakness};
use super::*;
use crate::config::GatewayTimeouts;
use crate::embedding::{MockEmbedder, hashed_bag_of_words};
use crate::retrieval::{EvidenceItem, EvidenceRetriever, RetrievalError, RetrieverConfig};
use crate::vectordb::{
    ChunkPayload, MockVectorDbClient, VectorDbClient, VectorPoint,
};

const DIM: usize = 64;
const COLLECTION: &str = "reasoning";

const WELL_FORMED: &str = "\
### SUMMARY
The claim ignores displacement in the short term.

### WEAKNESSES
- [E1] Factory employment fell after automation.
- [LOGIC] Aggregate growth does not imply every worker benefits.

### EVIDENCE USED
- [E1]
";

#[test]
fn test_parse_well_formed() {
    let parsed = parse_critique(WELL_FORMED).unwrap();

    assert_eq!(
        parsed.summary,
        "The claim ignores displacement in the short term."
    );
    assert_eq!(parsed.weaknesses.len(), 2);
    assert_eq!(parsed.weaknesses[0].citations, vec![Citation::Evidence(1)]);
    assert_eq!(
        parsed.weaknesses[0].statement,
        "Factory employment fell after automation."
    );
    assert_eq!(parsed.weaknesses[1].citations, vec![Citation::Logic]);
    assert_eq!(parsed.evidence_used, vec![1]);
}

#[test]
fn test_parse_ignores_preamble() {
    let text = format!("Sure, here is my critique.\n\n{WELL_FORMED}");
    assert!(parse_critique(&text).is_ok());
}

#[test]
fn test_parse_accepts_grouped_tags_numbered_bullets_and_continuations() {
    let text = "\
## Summary:
Weak.
## Weaknesses
1. [E1, E3] Both notes report the opposite
   trend over ten years.
2) **Scope** [LOGIC] Generalises from one sector.
## Evidence used
E1, E3, e3
";
    let parsed = parse_critique(text).unwrap();

    assert_eq!(
        parsed.weaknesses[0].citations,
        vec![Citation::Evidence(1), Citation::Evidence(3)]
    );
    assert_eq!(
        parsed.weaknesses[0].statement,
        "Both notes report the opposite trend over ten years."
    );
    assert_eq!(parsed.weaknesses[1].citations, vec![Citation::Logic]);
    assert_eq!(parsed.evidence_used, vec![1, 3]);
}

#[test]
fn test_parse_keeps_non_citation_brackets_in_statement() {
    let text = "\
### SUMMARY
s
### WEAKNESSES
- [E2] See [[Other Note]] for the counterexample.
### EVIDENCE USED
None
";
    let parsed = parse_critique(text).unwrap();
    assert_eq!(
        parsed.weaknesses[0].statement,
        "See [[Other Note]] for the counterexample."
    );
    assert!(parsed.evidence_used.is_empty());
}

#[test]
fn test_parse_none_weaknesses() {
    let text = "### SUMMARY\nFine.\n### WEAKNESSES\nNone.\n### EVIDENCE USED\nNone\n";
    let parsed = parse_critique(text).unwrap();
    assert!(parsed.weaknesses.is_empty());
}

#[test]
fn test_parse_rejects_malformed_output() {
    assert_eq!(
        parse_critique("Just some prose about the claim."),
        Err(ParseError::MissingSection("SUMMARY"))
    );
    assert_eq!(
        parse_critique("### SUMMARY\ns\n### EVIDENCE USED\n- [E1]\n### WEAKNESSES\n- [E1] w\n"),
        Err(ParseError::OutOfOrder)
    );
    assert_eq!(
        parse_critique("### SUMMARY\ns\n### SUMMARY\ns\n### WEAKNESSES\n### EVIDENCE USED\n"),
        Err(ParseError::DuplicateSection("SUMMARY"))
    );
    assert_eq!(
        parse_critique("### SUMMARY\n\n### WEAKNESSES\nNone\n### EVIDENCE USED\nNone\n"),
        Err(ParseError::EmptySummary)
    );
    assert!(matches!(
        parse_critique("### SUMMARY\ns\n### WEAKNESSES\n- no citation here\n### EVIDENCE USED\n"),
        Err(ParseError::UncitedWeakness(_))
    ));
}

#[test]
fn test_parse_keeps_other_headings_as_section_text() {
    let text = "\
## SUMMARY
The claim ignores displacement.
## WEAKNESSES
- [E1] Factory employment fell after automation.
## note
  the decline lasted a decade.
- [LOGIC] Growth is not evenly shared.
## EVIDENCE USED
- [E1]
";
    let parsed = parse_critique(text).unwrap();

    assert_eq!(parsed.weaknesses.len(), 2);
    assert_eq!(
        parsed.weaknesses[0].statement,
        "Factory employment fell after automation. ## note the decline lasted a decade."
    );
    assert_eq!(parsed.weaknesses[0].citations, vec![Citation::Evidence(1)]);
    assert_eq!(parsed.weaknesses[1].citations, vec![Citation::Logic]);
    assert_eq!(parsed.evidence_used, vec![1]);
}

fn evidence(n: usize) -> Vec<EvidenceItem> {
    (1..=n)
        .map(|i| EvidenceItem {
            document_id: format!("notes/{i}.md"),
            title: format!("Note {i}"),
            chunk_index: 0,
            text: format!("passage {i}"),
            tags: vec!["economics".to_string()],
            score: 1.0 / i as f32,
            rank: i,
        })
        .collect()
}

#[test]
fn test_prompt_tags_every_evidence_item() {
    let conversation = protocol::compose("claim text", Some("background"), &evidence(2));
    let user = conversation.last_user().unwrap();

    assert!(conversation.system.contains("[LOGIC]"));
    assert!(user.contains("claim text"));
    assert!(user.contains("background"));
    assert!(user.contains("[E1] Note 1 (notes/1.md) tags: economics"));
    assert!(user.contains("[E2] Note 2"));
    assert!(!user.contains("[E3]"));
}

#[test]
fn test_reformat_replays_rejected_output() {
    let first = protocol::compose("c", None, &[]);
    let retry = protocol::reformat(&first, "bad output", "missing section 'SUMMARY'");

    assert_eq!(retry.messages.len(), 3);
    assert_eq!(retry.messages[1].role, Role::Assistant);
    assert_eq!(retry.messages[1].content, "bad output");
    assert!(retry.last_user().unwrap().contains("### EVIDENCE USED"));
}

fn parsed(weaknesses: Vec<(&str, Vec<Citation>)>, used: Vec<usize>) -> ParsedCritique {
    ParsedCritique {
        summary: "summary".to_string(),
        weaknesses: weaknesses
            .into_iter()
            .map(|(s, citations)| ParsedWeakness {
                statement: s.to_string(),
                citations,
            })
            .collect(),
        evidence_used: used,
    }
}

#[test]
fn test_ground_drops_dangling_citations() {
    let critique = ground(
        parsed(
            vec![
                ("ok", vec![Citation::Evidence(2)]),
                ("dangling", vec![Citation::Evidence(1), Citation::Evidence(7)]),
                ("zero", vec![Citation::Evidence(0)]),
                ("logic", vec![Citation::Logic]),
            ],
            vec![2, 7],
        ),
        evidence(3),
    );

    assert_eq!(critique.dropped_weaknesses, 2);
    assert_eq!(critique.weaknesses.len(), 2);
    assert_eq!(critique.weaknesses[0].basis, WeaknessBasis::Evidence);
    assert_eq!(critique.weaknesses[1].basis, WeaknessBasis::Structural);
    assert_eq!(critique.evidence_used, vec![2]);
    assert_eq!(critique.evidence_count, 3);

    for weakness in &critique.weaknesses {
        for &c in &weakness.citations {
            assert!((1..=critique.evidence.len()).contains(&c));
        }
    }
}

#[test]
fn test_ground_without_evidence_keeps_only_structural() {
    let critique = ground(
        parsed(
            vec![
                ("cites", vec![Citation::Evidence(1)]),
                ("logic", vec![Citation::Logic]),
            ],
            vec![1],
        ),
        Vec::new(),
    );

    assert!(critique.summary.starts_with(NO_EVIDENCE_NOTICE));
    assert_eq!(critique.weaknesses.len(), 1);
    assert_eq!(critique.weaknesses[0].basis, WeaknessBasis::Structural);
    assert!(critique.evidence_used.is_empty());
}

type TestRetriever = EvidenceRetriever<MockEmbedder, MockVectorDbClient>;

async fn retriever_with(
    notes: &[(&str, &str, &[&str])],
) -> (Arc<TestRetriever>, Arc<MockVectorDbClient>) {
    let db = Arc::new(MockVectorDbClient::new());
    db.ensure_collection(COLLECTION, DIM as u64).await.unwrap();
    let points = notes
        .iter()
        .map(|(id, text, tags)| {
            VectorPoint::new(
                hashed_bag_of_words(text, DIM),
                ChunkPayload {
                    document_id: id.to_string(),
                    title: id.to_string(),
                    text: text.to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                },
            )
        })
        .collect();
    db.upsert_points(COLLECTION, points)
        .await
        .unwrap();

    let retriever = EvidenceRetriever::new(
        Arc::new(MockEmbedder::new(DIM)),
        Arc::clone(&db),
        RetrieverConfig {
            collection: COLLECTION.to_string(),
            overfetch_factor: 3,
            timeouts: GatewayTimeouts::default(),
        },
    );
    (Arc::new(retriever), db)
}

fn reasoner(
    retriever: Arc<TestRetriever>,
    model: Arc<MockLanguageModel>,
) -> AdversarialReasoner<MockEmbedder, MockVectorDbClient, MockLanguageModel> {
    AdversarialReasoner::new(
        retriever,
        model,
        ReasonerConfig {
            generation_timeout: Duration::from_secs(5),
            evidence_tag: None,
        },
    )
}

const JOBS_NOTES: &[(&str, &str, &[&str])] = &[
    (
        "jobs.md",
        "automation reduced factory employment in the region",
        &[],
    ),
    ("bread.md", "sourdough needs a warm kitchen", &[]),
];

#[tokio::test]
async fn test_challenge_produces_grounded_critique() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let critique = reasoner
        .challenge("automation improves employment", None, 1)
        .await
        .unwrap();

    assert_eq!(critique.evidence_count, 1);
    assert_eq!(critique.evidence[0].document_id, "jobs.md");
    assert_eq!(critique.weaknesses.len(), 2);
    assert_eq!(critique.dropped_weaknesses, 0);
    assert_eq!(model.call_count(), 1);

    let prompt = &model.conversations()[0];
    assert!(prompt.last_user().unwrap().contains("[E1] jobs.md"));
}

#[tokio::test]
async fn test_challenge_retries_once_with_reformat() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(MockLanguageModel::new([
        "The claim is weak because jobs were lost.",
        WELL_FORMED,
    ]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let critique = reasoner
        .challenge("automation improves employment", None, 2)
        .await
        .unwrap();

    assert_eq!(critique.weaknesses.len(), 2);
    let conversations = model.conversations();
    assert_eq!(conversations.len(), 2);
    assert_eq!(
        conversations[1].messages[1].content,
        "The claim is weak because jobs were lost."
    );
}

#[tokio::test]
async fn test_challenge_gives_up_after_second_malformed_reply() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(MockLanguageModel::new(["nope", "still nope", WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let err = reasoner
        .challenge("automation improves employment", None, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, ReasoningError::Format { .. }));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_challenge_on_empty_corpus() {
    let (retriever, _db) = retriever_with(&[]).await;
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let critique = reasoner
        .challenge("automation improves employment", None, 5)
        .await
        .unwrap();

    assert!(critique.summary.starts_with(NO_EVIDENCE_NOTICE));
    assert!(critique.evidence.is_empty());
    assert_eq!(critique.dropped_weaknesses, 1);
    assert!(
        critique
            .weaknesses
            .iter()
            .all(|w| w.basis == WeaknessBasis::Structural)
    );
}

#[tokio::test]
async fn test_generation_timeout_is_not_retried() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(
        MockLanguageModel::new([WELL_FORMED, WELL_FORMED]).with_delay(Duration::from_millis(200)),
    );
    let reasoner = AdversarialReasoner::new(
        retriever,
        Arc::clone(&model),
        ReasonerConfig {
            generation_timeout: Duration::from_millis(20),
            evidence_tag: None,
        },
    );

    let err = reasoner
        .challenge("automation improves employment", None, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, ReasoningError::GatewayTimeout { .. }));
    assert!(err.is_timeout());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_requests_never_reach_the_model() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    assert!(matches!(
        reasoner.challenge("  ", None, 3).await,
        Err(ReasoningError::InvalidRequest { .. })
    ));
    assert!(matches!(
        reasoner.challenge("a claim", None, 0).await,
        Err(ReasoningError::InvalidRequest { .. })
    ));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_retrieval_failure_surfaces() {
    let (retriever, db) = retriever_with(JOBS_NOTES).await;
    db.set_fail_searches(true);
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let err = reasoner
        .challenge("automation improves employment", None, 3)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReasoningError::Retrieval(RetrievalError::VectorDb(_))
    ));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_evidence_tag_merges_tagged_and_untagged_notes() {
    let (retriever, _db) = retriever_with(&[
        ("tagged.md", "automation and employment data", &["opponent"]),
        ("untagged.md", "automation and employment figures", &[]),
        ("bread.md", "sourdough needs a warm kitchen", &[]),
    ])
    .await;
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = AdversarialReasoner::new(
        retriever,
        Arc::clone(&model),
        ReasonerConfig {
            generation_timeout: Duration::from_secs(5),
            evidence_tag: Some("#Opponent".to_string()),
        },
    );

    let critique = reasoner
        .challenge("automation improves employment", None, 5)
        .await
        .unwrap();

    let ids: Vec<&str> = critique
        .evidence
        .iter()
        .map(|e| e.document_id.as_str())
        .collect();
    assert!(ids.contains(&"tagged.md"));
    assert!(ids.contains(&"untagged.md"));
    let mut distinct = ids.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), ids.len());
}

#[tokio::test]
async fn test_challenge_excluding_skips_source_note() {
    let (retriever, _db) = retriever_with(JOBS_NOTES).await;
    let model = Arc::new(MockLanguageModel::new([WELL_FORMED]));
    let reasoner = reasoner(retriever, Arc::clone(&model));

    let critique = reasoner
        .challenge_excluding("automation improves employment", None, 5, Some("jobs.md"))
        .await
        .unwrap();

    assert!(critique.evidence.iter().all(|e| e.document_id != "jobs.md"));
}
