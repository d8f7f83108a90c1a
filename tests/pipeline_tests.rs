//! Index, retrieve, link and challenge through the library API.

mod common;

use opponent::chunking::{Chunker, chunk_text};
use opponent::config::ConfigError;
use opponent::indexer::IndexError;
use opponent::reasoning::{NO_EVIDENCE_NOTICE, ReasoningError, WeaknessBasis};
use opponent::vault::Document;

use common::fixtures::{
    AI_CLAIM, ARTISAN_NOTE, AUTOMATION_NOTE, DANGLING_CRITIQUE, FREE_TEXT, GROUNDED_CRITIQUE,
    TEST_COLLECTION, VaultFixture, mock_service, test_config,
};

fn expected_chunks(id: &str, raw: &str, chunker: &Chunker) -> usize {
    let document = Document::parse(id, "untitled", raw);
    chunker.expected_chunks(document.body.chars().count())
}

#[tokio::test]
async fn test_indexing_is_idempotent() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);

    let first = fx.service.index_corpus(vault.path()).await.unwrap();
    assert_eq!(first.documents_indexed, 3);
    assert_eq!(first.documents_failed, 0);
    let points = fx.db.point_count(TEST_COLLECTION).unwrap();
    assert_eq!(first.chunks_written, points);

    let embeds_after_first = fx.embedder.calls();
    let second = fx.service.index_corpus(vault.path()).await.unwrap();

    assert_eq!(second.documents_indexed, 0);
    assert_eq!(second.documents_unchanged, 3);
    assert_eq!(second.chunks_written, 0);
    assert_eq!(fx.db.point_count(TEST_COLLECTION), Some(points));
    assert_eq!(fx.embedder.calls(), embeds_after_first);
}

#[tokio::test]
async fn test_concurrent_passes_index_each_document_once() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);

    let (a, b) = futures::future::join(
        fx.service.index_corpus(vault.path()),
        fx.service.index_corpus(vault.path()),
    )
    .await;
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.documents_indexed + b.documents_indexed, 3);
    assert_eq!(a.documents_unchanged + b.documents_unchanged, 3);
    assert_eq!(
        fx.db.point_count(TEST_COLLECTION),
        Some(a.chunks_written + b.chunks_written)
    );
}

#[tokio::test]
async fn test_chunk_counts_follow_chunker() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    let chunker = Chunker::new(config.chunk_size, config.chunk_overlap).unwrap();

    fx.service.index_corpus(vault.path()).await.unwrap();

    let payloads = fx
        .db
        .document_payloads(TEST_COLLECTION, "economics/automation.md");
    assert_eq!(
        payloads.len(),
        expected_chunks("economics/automation.md", AUTOMATION_NOTE, &chunker)
    );
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(payload.chunk_index, i);
        assert_eq!(payload.title, "Automation and Employment");
        assert_eq!(payload.tags, vec!["economics", "labor"]);
    }
}

#[tokio::test]
async fn test_edited_note_replaces_all_old_records() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let before = fx
        .db
        .document_payloads(TEST_COLLECTION, "economics/automation.md");
    assert!(before.len() > 1);

    vault.write("economics/automation.md", "Robots arrived.");
    let report = fx.service.index_corpus(vault.path()).await.unwrap();

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.documents_unchanged, 2);
    assert_eq!(report.chunks_written, 1);

    let after = fx
        .db
        .document_payloads(TEST_COLLECTION, "economics/automation.md");
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].text, "Robots arrived.");
    assert_ne!(after[0].fingerprint, before[0].fingerprint);
}

#[tokio::test]
async fn test_index_rejects_missing_root() {
    let vault = VaultFixture::new();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);

    let err = fx
        .service
        .index_corpus(&vault.path().join("does-not-exist"))
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::Config(_)));
}

#[test]
fn test_chunk_count_formula_holds() {
    let samples = [
        "a".repeat(1),
        "b".repeat(50),
        "c".repeat(51),
        "lorem ipsum ".repeat(40),
        "héllo wörld ✓ ".repeat(33),
    ];

    for (size, overlap) in [(50, 0), (50, 10), (64, 63), (120, 20), (7, 3)] {
        for text in &samples {
            let chunks = chunk_text("doc.md", text, size, overlap).unwrap();
            let len = text.chars().count();

            let expected = if len <= size {
                1
            } else {
                (len - overlap).div_ceil(size - overlap)
            };
            assert_eq!(chunks.len(), expected, "len={len} size={size} overlap={overlap}");

            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i);
                assert!(chunk.text.chars().count() <= size);
                assert_eq!(chunk.char_start, i * (size - overlap));
            }
            assert_eq!(chunks.last().unwrap().char_end, len);

            for pair in chunks.windows(2) {
                let tail: String = pair[0].text.chars().skip(size - overlap).collect();
                assert!(pair[1].text.starts_with(&tail));
            }
        }
    }

    assert!(chunk_text("doc.md", "", 50, 10).unwrap().is_empty());
    assert!(chunk_text("doc.md", "text", 10, 10).is_err());
}

#[tokio::test]
async fn test_retrieval_respects_bounds() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    for max in 1..=6 {
        let links = fx
            .service
            .find_links("automation displaced factory workers", "draft.md", max)
            .await
            .unwrap();

        assert!(!links.is_empty());
        assert!(links.len() <= max);
        for (i, item) in links.iter().enumerate() {
            assert_eq!(item.rank, i + 1);
        }
        for pair in links.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    let top = fx
        .service
        .find_links("automation displaced factory workers", "draft.md", 1)
        .await
        .unwrap();
    assert_eq!(top[0].document_id, "economics/automation.md");
}

#[tokio::test]
async fn test_find_links_never_returns_the_note_itself() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let absolute = vault.path().join("economics/automation.md");
    for note_id in ["economics/automation.md", absolute.to_str().unwrap()] {
        let links = fx
            .service
            .find_links(AUTOMATION_NOTE, note_id, 5)
            .await
            .unwrap();

        assert!(!links.is_empty());
        assert!(
            links
                .iter()
                .all(|l| l.document_id != "economics/automation.md")
        );
    }
}

#[tokio::test]
async fn test_challenge_ai_claim_is_grounded() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[GROUNDED_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let critique = fx.service.challenge(AI_CLAIM, None, 2).await.unwrap();

    assert_eq!(critique.evidence.len(), 2);
    assert_eq!(critique.evidence_count, 2);
    assert_eq!(critique.dropped_weaknesses, 0);
    assert_eq!(critique.weaknesses.len(), 3);
    assert_eq!(critique.weaknesses[0].basis, WeaknessBasis::Evidence);
    assert_eq!(critique.weaknesses[1].citations, vec![1, 2]);
    assert_eq!(critique.weaknesses[2].basis, WeaknessBasis::Structural);
    assert!(critique.weaknesses[2].citations.is_empty());
    assert_eq!(critique.evidence_used, vec![1, 2]);

    let conversations = fx.model.conversations();
    assert_eq!(conversations.len(), 1);
    let prompt = conversations[0].last_user().unwrap();
    assert!(prompt.contains(AI_CLAIM));
    assert!(prompt.contains("[E1]"));
    assert!(prompt.contains("[E2]"));
    assert!(!prompt.contains("[E3]"));
}

#[tokio::test]
async fn test_challenge_drops_dangling_citations() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[DANGLING_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let critique = fx.service.challenge(AI_CLAIM, None, 3).await.unwrap();

    assert_eq!(critique.dropped_weaknesses, 1);
    assert_eq!(critique.weaknesses.len(), 1);
    assert_eq!(critique.weaknesses[0].basis, WeaknessBasis::Structural);
    assert!(critique.evidence_used.is_empty());
}

#[tokio::test]
async fn test_challenge_with_empty_corpus() {
    let vault = VaultFixture::new();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[GROUNDED_CRITIQUE]);

    let report = fx.service.index_corpus(vault.path()).await.unwrap();
    assert_eq!(report.documents_indexed, 0);

    let critique = fx.service.challenge(AI_CLAIM, None, 5).await.unwrap();

    assert!(critique.summary.starts_with(NO_EVIDENCE_NOTICE));
    assert!(critique.evidence.is_empty());
    assert_eq!(critique.evidence_count, 0);
    assert!(critique.evidence_used.is_empty());
    assert!(
        critique
            .weaknesses
            .iter()
            .all(|w| w.basis == WeaknessBasis::Structural)
    );
    assert_eq!(critique.dropped_weaknesses, 2);
    assert_eq!(fx.model.call_count(), 1);
}

#[tokio::test]
async fn test_challenge_recovers_from_one_malformed_reply() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[FREE_TEXT, GROUNDED_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let critique = fx.service.challenge(AI_CLAIM, None, 2).await.unwrap();

    assert_eq!(critique.weaknesses.len(), 3);
    assert_eq!(fx.model.call_count(), 2);
    let retry = &fx.model.conversations()[1];
    assert!(retry.messages.iter().any(|m| m.content == FREE_TEXT));
}

#[tokio::test]
async fn test_challenge_gives_up_after_second_malformed_reply() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[FREE_TEXT, FREE_TEXT, GROUNDED_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let err = fx.service.challenge(AI_CLAIM, None, 2).await.unwrap_err();

    assert!(matches!(err, ReasoningError::Format { .. }));
    assert_eq!(fx.model.call_count(), 2);
}

#[tokio::test]
async fn test_challenge_note_excludes_its_source() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[GROUNDED_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let critique = fx
        .service
        .challenge_note(ARTISAN_NOTE, None, 5, "economics/artisans.md")
        .await
        .unwrap();

    assert!(!critique.evidence.is_empty());
    assert!(
        critique
            .evidence
            .iter()
            .all(|e| e.document_id != "economics/artisans.md")
    );
}

#[tokio::test]
async fn test_default_evidence_tag_keeps_untagged_notes() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    assert_eq!(config.evidence_tag.as_deref(), Some("opponent"));
    let fx = mock_service(&config, &[GROUNDED_CRITIQUE]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    let critique = fx.service.challenge(AI_CLAIM, None, 5).await.unwrap();

    let documents: Vec<&str> = critique
        .evidence
        .iter()
        .map(|e| e.document_id.as_str())
        .collect();
    assert!(documents.contains(&"economics/artisans.md"));
    assert!(documents.contains(&"economics/automation.md"));
    let mut distinct = documents.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), documents.len());
}

#[tokio::test]
async fn test_remove_and_reconcile() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    fx.service.index_corpus(vault.path()).await.unwrap();

    assert!(fx.service.remove_document("garden.md").await.unwrap());
    assert!(!fx.service.remove_document("garden.md").await.unwrap());
    assert!(fx.db.document_payloads(TEST_COLLECTION, "garden.md").is_empty());

    vault.remove("economics/artisans.md");
    let report = fx.service.reconcile(vault.path()).await.unwrap();
    assert_eq!(report.documents_removed, vec!["economics/artisans.md"]);

    let links = fx
        .service
        .find_links("artificial intelligence jobs", "draft.md", 5)
        .await
        .unwrap();
    assert!(
        links
            .iter()
            .all(|l| l.document_id == "economics/automation.md")
    );
}

#[tokio::test]
async fn test_reconcile_against_another_directory_keeps_the_index() {
    let vault = VaultFixture::seeded();
    let config = test_config(vault.path());
    let fx = mock_service(&config, &[]);
    fx.service.index_corpus(vault.path()).await.unwrap();
    let points = fx.db.point_count(TEST_COLLECTION);

    let empty = VaultFixture::new();
    let err = fx.service.reconcile(empty.path()).await.unwrap_err();
    assert!(matches!(
        err,
        IndexError::Config(ConfigError::ForeignRoot { .. })
    ));

    let err = fx.service.index_corpus(empty.path()).await.unwrap_err();
    assert!(matches!(
        err,
        IndexError::Config(ConfigError::ForeignRoot { .. })
    ));

    assert_eq!(fx.db.point_count(TEST_COLLECTION), points);
    let report = fx.service.reconcile(vault.path()).await.unwrap();
    assert!(report.documents_removed.is_empty());
}
