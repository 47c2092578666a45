//! Stage payloads. These are what get stored as artifacts and hashed into the run hash.

use serde::{Deserialize, Serialize};
use sfq_core::domain::Severity;

pub const MAX_CITATIONS: usize = 3;
pub const MAX_QUOTE_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerAction {
    Answer,
    /// Abstain: evidence was judged insufficient.
    Flag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub doc_id: String,
    pub section: String,
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_idx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_distance: Option<f64>,
}

pub fn truncate_quote(quote: &str) -> String {
    quote.chars().take(MAX_QUOTE_CHARS).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerPayload {
    pub action: AnswerAction,
    /// Empty whenever `action` is `Flag`.
    pub answer: String,
    pub citations: Vec<Citation>,
    pub answer_confidence: f64,
    pub notes: String,
    pub debug_info: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Defect {
    #[serde(rename = "type")]
    pub kind: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewResult {
    pub verification_conf: f64,
    pub defects: Vec<Defect>,
    pub fixed_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskResult {
    pub category: String,
    pub severity: Severity,
    pub needs_human: bool,
    pub reason: String,
}
