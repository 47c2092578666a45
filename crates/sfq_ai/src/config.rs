//! Engine configuration.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`SAFEFORMS_*`)
//! 2. TOML file passed to [`SafeFormsConfig::load`]
//! 3. Compiled defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sfq_core::error::{codes, AppError};
use sfq_core::tokens::TokenConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SafeFormsConfig {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub reader: ReaderConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory of `*.md` policy documents. Default: `policies`.
    pub policy_dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from("policies"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub index_dir: PathBuf,
    /// Window size in characters of the normalized text. Default: 1400.
    pub chunk_chars: usize,
    /// Characters shared by consecutive windows. Default: 200.
    pub chunk_overlap: usize,
    pub embedding_model: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            chunk_chars: 1400,
            chunk_overlap: 200,
            embedding_model: "BAAI/bge-small-en-v1.5".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Passages farther than this cosine distance are dropped. Default: no cutoff.
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_distance: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    pub model: String,
    pub first_pass_tau: f64,
    pub second_pass_tau: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            model: "deepset/roberta-base-squad2".to_string(),
            first_pass_tau: 1.5,
            second_pass_tau: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Embedding server. Must be `127.0.0.1`.
    pub base_url: String,
    /// Extractive reader server. Must be `127.0.0.1`.
    pub reader_url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            reader_url: "http://127.0.0.1:8008".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// First-pass verification confidence below this triggers the single retry.
    pub retry_below: f64,
    pub min_answer_confidence: f64,
    pub min_verification_conf: f64,
    /// Size of the batch worker pool.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_below: 0.70,
            min_answer_confidence: 0.65,
            min_verification_conf: 0.70,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("safeforms.sqlite"),
        }
    }
}

impl SafeFormsConfig {
    /// Defaults, then `path` if given, then environment overrides; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|e| {
                    AppError::new(codes::CONFIG_INVALID, "Failed to read config file")
                        .with_details(format!("path={}; err={}", p.display(), e))
                })?;
                Self::from_toml(&raw).map_err(|e| {
                    let err = e.details.clone().unwrap_or_default();
                    e.with_details(format!("path={}; err={}", p.display(), err))
                })?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse config TOML")
                .with_details(e.to_string())
        })
    }

    /// Apply `SAFEFORMS_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SAFEFORMS_SECRET_KEY") {
            self.tokens.secret = v;
        }
        if let Some(v) = lookup("SAFEFORMS_POLICY_DIR") {
            self.corpus.policy_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SAFEFORMS_INDEX_DIR") {
            self.index.index_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SAFEFORMS_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SAFEFORMS_MODEL_BASE_URL") {
            self.models.base_url = v;
        }
        if let Some(v) = lookup("SAFEFORMS_READER_URL") {
            self.models.reader_url = v;
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.index.chunk_chars == 0 {
            return Err(invalid("index.chunk_chars", "must be positive"));
        }
        if self.index.chunk_overlap >= self.index.chunk_chars {
            return Err(invalid("index.chunk_overlap", "must be smaller than index.chunk_chars"));
        }
        if self.index.embedding_model.trim().is_empty() {
            return Err(invalid("index.embedding_model", "must not be empty"));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be positive"));
        }
        if let Some(d) = self.retrieval.max_distance {
            if !d.is_finite() || d < 0.0 {
                return Err(invalid("retrieval.max_distance", "must be a non-negative number"));
            }
        }
        for (field, v) in [
            ("reader.first_pass_tau", self.reader.first_pass_tau),
            ("reader.second_pass_tau", self.reader.second_pass_tau),
            ("pipeline.retry_below", self.pipeline.retry_below),
            ("pipeline.min_answer_confidence", self.pipeline.min_answer_confidence),
            ("pipeline.min_verification_conf", self.pipeline.min_verification_conf),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        if self.pipeline.workers == 0 {
            return Err(invalid("pipeline.workers", "must be positive"));
        }
        if self.tokens.ttl_secs <= 0 {
            return Err(invalid("tokens.ttl_secs", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::new(codes::CONFIG_INVALID, format!("{field} {message}")).with_details(format!("field={field}"))
}
