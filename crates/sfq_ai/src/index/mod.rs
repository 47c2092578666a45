use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use sfq_core::error::{codes, AppError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::IndexConfig;
use crate::corpus::{chunk_document, Corpus};
use crate::embeddings::Embedder;

const SNAPSHOT_FILE: &str = "index_snapshot.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_idx: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default)]
    pub section: String,
    pub embedding: Vec<f32>,
}

/// Immutable, wholesale-rebuilt index. Chunk order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSnapshot {
    pub chunks: Vec<Chunk>,
    pub build_timestamp: String,
    pub embedding_model: String,
    pub dims: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBuildState {
    Built,
    Existing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexBuildReport {
    pub status: IndexBuildState,
    pub indexed_chunk_count: usize,
    pub embedding_model: String,
    pub dims: usize,
    pub build_timestamp: String,
}

pub struct ChunkIndexer {
    corpus: Arc<dyn Corpus>,
    embedder: Arc<dyn Embedder>,
    index_dir: PathBuf,
    embedding_model: String,
    chunk_chars: usize,
    chunk_overlap: usize,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    // Serializes builds; readers never take it.
    build_lock: Mutex<()>,
}

fn lock_poisoned(what: &str) -> AppError {
    AppError::new("INDEX_LOCK_POISONED", "Index lock poisoned").with_details(what.to_string())
}

impl ChunkIndexer {
    pub fn new(config: &IndexConfig, corpus: Arc<dyn Corpus>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            corpus,
            embedder,
            index_dir: config.index_dir.clone(),
            embedding_model: config.embedding_model.clone(),
            chunk_chars: config.chunk_chars,
            chunk_overlap: config.chunk_overlap,
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.index_dir.join(SNAPSHOT_FILE)
    }

    /// Cheap presence check: a loaded snapshot or a snapshot file on disk.
    pub fn is_present(&self) -> bool {
        let loaded = self.current.read().map(|g| g.is_some()).unwrap_or(false);
        loaded || self.snapshot_path().exists()
    }

    /// The live snapshot, loading it from disk on first use.
    pub fn current(&self) -> Result<Option<Arc<IndexSnapshot>>, AppError> {
        if let Some(s) = self.current.read().map_err(|_| lock_poisoned("read"))?.as_ref() {
            return Ok(Some(s.clone()));
        }
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let snapshot = Arc::new(read_snapshot(&path)?);
        let mut slot = self.current.write().map_err(|_| lock_poisoned("write"))?;
        // Another reader may have loaded it meanwhile; keep whichever landed first.
        Ok(Some(slot.get_or_insert(snapshot).clone()))
    }

    /// Build the index. Without `reset`, an existing snapshot is returned unchanged.
    pub fn build(&self, reset: bool) -> Result<IndexBuildReport, AppError> {
        let (state, snapshot) = self.build_snapshot(reset)?;
        Ok(IndexBuildReport {
            status: state,
            indexed_chunk_count: snapshot.chunks.len(),
            embedding_model: snapshot.embedding_model.clone(),
            dims: snapshot.dims,
            build_timestamp: snapshot.build_timestamp.clone(),
        })
    }

    /// The live snapshot, building one without reset when none exists.
    pub fn load_or_build(&self) -> Result<Arc<IndexSnapshot>, AppError> {
        if let Some(s) = self.current()? {
            return Ok(s);
        }
        tracing::info!("index missing; building lazily");
        self.build_snapshot(false).map(|(_, s)| s)
    }

    fn build_snapshot(&self, reset: bool) -> Result<(IndexBuildState, Arc<IndexSnapshot>), AppError> {
        let _guard = self.build_lock.lock().map_err(|_| lock_poisoned("build"))?;

        if !reset {
            if let Some(existing) = self.current()? {
                return Ok((IndexBuildState::Existing, existing));
            }
        }

        let snapshot = Arc::new(self.embed_corpus()?);
        write_snapshot(&self.index_dir, &self.snapshot_path(), &snapshot)?;
        *self.current.write().map_err(|_| lock_poisoned("write"))? = Some(snapshot.clone());

        tracing::info!(
            chunks = snapshot.chunks.len(),
            model = %snapshot.embedding_model,
            dims = snapshot.dims,
            reset,
            "index built"
        );
        Ok((IndexBuildState::Built, snapshot))
    }

    fn embed_corpus(&self) -> Result<IndexSnapshot, AppError> {
        let docs = self.corpus.list().map_err(|e| {
            AppError::new(codes::INDEX_BUILD_FAILED, "Failed to list corpus documents")
                .with_details(e.to_string())
                .with_retryable(e.retryable)
        })?;

        let mut chunks = Vec::new();
        let mut dims: Option<usize> = None;
        for doc in &docs {
            for draft in chunk_document(&doc.raw_text, self.chunk_chars, self.chunk_overlap) {
                let embedding = self.embedder.embed(&self.embedding_model, &draft.text).map_err(|e| {
                    AppError::new(codes::EMBEDDINGS_FAILED, "Failed to compute embeddings")
                        .with_details(format!(
                            "doc_id={}; chunk_idx={}; err={}",
                            doc.doc_id, draft.chunk_idx, e
                        ))
                        .with_retryable(e.retryable)
                })?;
                match dims {
                    Some(d) if d != embedding.len() => {
                        return Err(AppError::new(
                            codes::INDEX_BUILD_FAILED,
                            "Embedding dimension mismatch across chunks",
                        )
                        .with_details(format!(
                            "expected={}; got={}; doc_id={}; chunk_idx={}",
                            d,
                            embedding.len(),
                            doc.doc_id,
                            draft.chunk_idx
                        )));
                    }
                    Some(_) => {}
                    None => dims = Some(embedding.len()),
                }
                chunks.push(Chunk {
                    doc_id: doc.doc_id.clone(),
                    chunk_idx: draft.chunk_idx,
                    start: draft.start,
                    end: draft.end,
                    text: draft.text,
                    section: draft.section,
                    embedding,
                });
            }
        }

        let dims = match dims {
            Some(d) if !chunks.is_empty() => d,
            _ => {
                return Err(AppError::new(
                    codes::INDEX_BUILD_EMPTY_CORPUS,
                    "Corpus has no indexable text",
                )
                .with_details(format!("documents={}", docs.len())));
            }
        };

        let build_timestamp = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
            AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string())
        })?;

        Ok(IndexSnapshot {
            chunks,
            build_timestamp,
            embedding_model: self.embedding_model.clone(),
            dims,
        })
    }
}

fn read_snapshot(path: &Path) -> Result<IndexSnapshot, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("INDEX_LOAD_FAILED", "Failed to read index snapshot")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("INDEX_LOAD_FAILED", "Failed to decode index snapshot")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn write_snapshot(dir: &Path, path: &Path, snapshot: &IndexSnapshot) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to create index directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(snapshot).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to encode index snapshot")
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, &json).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to write index snapshot")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to finalize index snapshot write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
