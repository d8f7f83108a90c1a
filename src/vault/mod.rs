//! Markdown vault reading.
//!
//! A vault is a directory tree of `.md` notes. Hidden entries (such as
//! `.obsidian/` or `.trash/`) are skipped. Document ids are vault-relative
//! paths with `/` separators, so they are stable across machines.

mod document;
mod error;


pub use document::{Document, inline_tags, normalize_tags, split_frontmatter};
pub use error::VaultError;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::validate_corpus_root;

/// Documents found in one pass over a corpus root.
#[derive(Debug, Default)]
pub struct VaultScan {
    /// Sorted by id.
    pub documents: Vec<Document>,
    /// Files that matched but could not be read.
    pub unreadable: Vec<PathBuf>,
}

/// Enumerates the documents of a corpus.
pub trait DocumentSource: Send + Sync + 'static {
    /// Reads every document under `root`.
    ///
    /// Fails only if `root` itself is unusable; per-file problems are
    /// reported in [`VaultScan::unreadable`].
    fn scan(&self, root: &Path) -> Result<VaultScan, VaultError>;
}

/// Filesystem vault of markdown notes.
#[derive(Debug, Clone)]
pub struct MarkdownVault {
    extension: String,
}

impl Default for MarkdownVault {
    fn default() -> Self {
        Self {
            extension: "md".to_string(),
        }
    }
}

impl MarkdownVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses one file under `root`.
    pub fn load_document(&self, root: &Path, path: &Path) -> Result<Document, VaultError> {
        let id = document_id_for(root, path)?;
        let raw = std::fs::read(path).map_err(|source| VaultError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = String::from_utf8(raw).map_err(|e| VaultError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let mut document = Document::parse(id, stem, &raw);
        if let Some(modified) = std::fs::metadata(path).and_then(|m| m.modified()).ok() {
            document.modified_at = Some(DateTime::<Utc>::from(modified));
        }
        Ok(document)
    }

    fn is_note(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

impl DocumentSource for MarkdownVault {
    fn scan(&self, root: &Path) -> Result<VaultScan, VaultError> {
        validate_corpus_root(root)?;

        let mut scan = VaultScan::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    if e.depth() == 0 {
                        return Err(VaultError::Walk {
                            path,
                            message: e.to_string(),
                        });
                    }
                    warn!(path = %path.display(), error = %e, "Skipping unreadable vault entry");
                    scan.unreadable.push(path);
                    continue;
                }
            };

            if !self.is_note(&entry) {
                continue;
            }

            match self.load_document(root, entry.path()) {
                Ok(document) => scan.documents.push(document),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable note");
                    scan.unreadable.push(entry.path().to_path_buf());
                }
            }
        }

        scan.documents.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            root = %root.display(),
            documents = scan.documents.len(),
            unreadable = scan.unreadable.len(),
            "Scanned vault"
        );
        Ok(scan)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Vault-relative, `/`-separated id of a file under `root`.
pub fn document_id_for(root: &Path, path: &Path) -> Result<String, VaultError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| VaultError::OutsideRoot {
            path: path.to_path_buf(),
        })?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

/// Maps a client-supplied note path onto a document id.
///
/// Absolute paths inside `root` become vault-relative; anything else is
/// treated as already relative.
pub fn normalize_document_id(root: &Path, raw: &str) -> String {
    let raw = raw.trim();
    let path = Path::new(raw);

    if path.is_absolute() {
        let canonical_root = root.canonicalize().ok();
        for candidate in std::iter::once(root).chain(canonical_root.as_deref()) {
            if let Ok(id) = document_id_for(candidate, path) {
                return id;
            }
        }
    }

    raw.replace('\\', "/").trim_start_matches("./").to_string()
}
