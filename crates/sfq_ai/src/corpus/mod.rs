use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sfq_core::error::AppError;

pub mod chunking;

pub use chunking::{chunk_document, ChunkDraft};

/// One source policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub doc_id: String,
    pub raw_text: String,
}

pub trait Corpus: Send + Sync {
    /// All documents, in a stable order.
    fn list(&self) -> Result<Vec<Document>, AppError>;
}

/// Every `*.md` file directly under a policy directory, ordered by file name.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    dir: PathBuf,
}

impl DirectoryCorpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Corpus for DirectoryCorpus {
    fn list(&self) -> Result<Vec<Document>, AppError> {
        if !self.dir.exists() {
            tracing::debug!(dir = %self.dir.display(), "policy directory missing; corpus is empty");
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            AppError::new("CORPUS_READ_FAILED", "Failed to read policy directory")
                .with_details(format!("path={}; err={}", self.dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|ent| ent.path())
            .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("md"))
            .collect();
        files.sort();

        let mut out = Vec::with_capacity(files.len());
        for path in files {
            let raw_text = fs::read_to_string(&path).map_err(|e| {
                AppError::new("CORPUS_READ_FAILED", "Failed to read policy document")
                    .with_details(format!("path={}; err={}", path.display(), e))
            })?;
            let doc_id = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            out.push(Document { doc_id, raw_text });
        }
        Ok(out)
    }
}
