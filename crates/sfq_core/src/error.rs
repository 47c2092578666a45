use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by both crates.
///
/// Abstaining and pending quorum are valid outcomes, not errors, so they have no code here.
pub mod codes {
    pub const INDEX_BUILD_EMPTY_CORPUS: &str = "INDEX_BUILD_EMPTY_CORPUS";
    pub const INDEX_BUILD_FAILED: &str = "INDEX_BUILD_FAILED";
    pub const RETRIEVAL_UNAVAILABLE: &str = "RETRIEVAL_UNAVAILABLE";
    pub const RETRIEVAL_FAILED: &str = "RETRIEVAL_FAILED";
    pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";
    pub const EMBEDDINGS_FAILED: &str = "EMBEDDINGS_FAILED";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const TOKEN_ISSUE_INVALID: &str = "TOKEN_ISSUE_INVALID";
    pub const PIPELINE_ALREADY_FINAL: &str = "PIPELINE_ALREADY_FINAL";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
}

/// Single structured error shape used across the engine and returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details.as_deref() {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
