//! Test fixtures for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use opponent::config::Config;
use opponent::embedding::MockEmbedder;
use opponent::reasoning::MockLanguageModel;
use opponent::service::OpponentService;
use opponent::vault::MarkdownVault;
use opponent::vectordb::MockVectorDbClient;
use tempfile::TempDir;

pub const TEST_DIM: usize = 128;

pub const TEST_COLLECTION: &str = "opponent_test";

pub type MockService = OpponentService<MockEmbedder, MockVectorDbClient, MockLanguageModel>;

pub const AUTOMATION_NOTE: &str = "\
---
title: Automation and Employment
tags: [economics, labor]
---
Studies of regional labor markets found that automation displaced factory workers \
and employment in manufacturing towns fell for a decade after robots arrived.";

pub const ARTISAN_NOTE: &str = "\
---
title: Artisan Jobs
---
Some artificial intelligence tools created new jobs for artisans, but the new \
employment concentrated in large cities and rarely reached displaced workers. #opponent";

pub const GARDEN_NOTE: &str = "\
Tomatoes ripen faster when the greenhouse stays warm overnight and the soil drains well.";

pub const AI_CLAIM: &str = "Artificial intelligence will create more jobs than it destroys.";

/// A well-formed critique citing the first two evidence items.
pub const GROUNDED_CRITIQUE: &str = "\
## SUMMARY
The claim overlooks displacement documented in the vault.

## WEAKNESSES
1. Automation displaced factory workers for a decade. [E1]
2. New jobs concentrated in cities away from displaced workers. [E1, E2]
3. Counting jobs says nothing about who gets them. [LOGIC]

## EVIDENCE USED
[E1], [E2]
";

/// Cites an evidence item that is never supplied.
pub const DANGLING_CRITIQUE: &str = "\
## SUMMARY
The claim is contradicted.

## WEAKNESSES
- The vault shows wage stagnation. [E7]
- Job counts ignore job quality. [LOGIC]

## EVIDENCE USED
- [E7]
";

pub const FREE_TEXT: &str = "I think the claim is mostly wrong, honestly.";

/// A temporary markdown vault.
pub struct VaultFixture {
    dir: TempDir,
}

impl VaultFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp vault"),
        }
    }

    /// The vault seeded with the automation, artisan and garden notes.
    pub fn seeded() -> Self {
        Self::new()
            .note("economics/automation.md", AUTOMATION_NOTE)
            .note("economics/artisans.md", ARTISAN_NOTE)
            .note("garden.md", GARDEN_NOTE)
    }

    pub fn note(self, relative: &str, content: &str) -> Self {
        self.write(relative, content);
        self
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create note directory");
        }
        fs::write(path, content).expect("write note");
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.dir.path().join(relative)).expect("remove note");
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

pub fn test_config(vault: &Path) -> Config {
    Config {
        vault_path: vault.to_path_buf(),
        collection_name: TEST_COLLECTION.to_string(),
        embedding_dim: TEST_DIM,
        chunk_size: 120,
        chunk_overlap: 20,
        ..Config::default()
    }
}

/// Service over mocks plus handles to inspect them.
pub struct ServiceFixture {
    pub service: Arc<MockService>,
    pub db: Arc<MockVectorDbClient>,
    pub embedder: Arc<MockEmbedder>,
    pub model: Arc<MockLanguageModel>,
}

pub fn mock_service(config: &Config, responses: &[&str]) -> ServiceFixture {
    let db = Arc::new(MockVectorDbClient::new());
    let embedder = Arc::new(MockEmbedder::new(config.embedding_dim));
    let model = Arc::new(MockLanguageModel::new(responses.iter().copied()));

    let service = OpponentService::new(
        Arc::clone(&embedder),
        Arc::clone(&db),
        Arc::clone(&model),
        Arc::new(MarkdownVault::new()),
        config,
    )
    .expect("valid test config");

    ServiceFixture {
        service: Arc::new(service),
        db,
        embedder,
        model,
    }
}
