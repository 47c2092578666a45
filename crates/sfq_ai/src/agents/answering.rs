use std::sync::Arc;

use serde_json::json;
use sfq_core::error::{codes, AppError};

use crate::extract::{ExtractionVerdict, SpanExtractor};
use crate::payload::{AnswerAction, AnswerPayload, MAX_CITATIONS};
use crate::retrieve::{DenseRetriever, RetrievedPassage};

pub const REASON_NO_PASSAGES: &str = "no_passages_found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPass {
    First,
    Second,
}

impl AnswerPass {
    pub fn notes(&self) -> &'static str {
        match self {
            AnswerPass::First => "first-pass",
            AnswerPass::Second => "second-pass",
        }
    }
}

/// Retrieval plus extraction, normalized into an [`AnswerPayload`].
///
/// The two passes share retrieval and differ only in the abstain threshold.
pub struct AnsweringAgent {
    retriever: Arc<DenseRetriever>,
    extractor: Arc<SpanExtractor>,
    top_k: usize,
    first_pass_tau: f64,
    second_pass_tau: f64,
}

impl AnsweringAgent {
    pub fn new(
        retriever: Arc<DenseRetriever>,
        extractor: Arc<SpanExtractor>,
        top_k: usize,
        first_pass_tau: f64,
        second_pass_tau: f64,
    ) -> Self {
        Self {
            retriever,
            extractor,
            top_k,
            first_pass_tau,
            second_pass_tau,
        }
    }

    pub fn tau_for(&self, pass: AnswerPass) -> f64 {
        match pass {
            AnswerPass::First => self.first_pass_tau,
            AnswerPass::Second => self.second_pass_tau,
        }
    }

    pub fn answer_pass(&self, question: &str, pass: AnswerPass) -> Result<AnswerPayload, AppError> {
        self.run(question, self.tau_for(pass), pass.notes())
    }

    /// One-shot answer with a caller-chosen threshold.
    pub fn answer(&self, question: &str, tau: f64) -> Result<AnswerPayload, AppError> {
        self.run(question, tau, "direct")
    }

    fn run(&self, question: &str, tau: f64, notes: &str) -> Result<AnswerPayload, AppError> {
        // A NaN threshold would never abstain.
        if !tau.is_finite() || tau < 0.0 {
            return Err(AppError::new(codes::CONFIG_INVALID, "Abstain threshold must be finite and non-negative")
                .with_details(format!("tau={tau}")));
        }
        let passages = self.retriever.retrieve(question, self.top_k)?;
        if passages.is_empty() {
            return Ok(AnswerPayload {
                action: AnswerAction::Flag,
                answer: String::new(),
                citations: Vec::new(),
                answer_confidence: 0.0,
                notes: notes.to_string(),
                debug_info: json!({ "reason": REASON_NO_PASSAGES, "tau": tau, "retrieval": [] }),
            });
        }

        let verdict = self.extractor.decide(question, &passages, tau);
        tracing::debug!(
            notes,
            reason = verdict.reason,
            confidence = verdict.confidence,
            failures = verdict.failures.len(),
            "extraction verdict"
        );
        Ok(normalize(verdict, &passages, notes))
    }
}

fn retrieval_summary(passages: &[RetrievedPassage]) -> serde_json::Value {
    passages
        .iter()
        .map(|p| {
            json!({
                "doc_id": p.chunk.doc_id,
                "chunk_idx": p.chunk.chunk_idx,
                "distance": f64::from(p.distance),
                "length": p.chunk.end - p.chunk.start,
            })
        })
        .collect()
}

fn normalize(verdict: ExtractionVerdict, passages: &[RetrievedPassage], notes: &str) -> AnswerPayload {
    let mut debug = json!({
        "reason": verdict.reason,
        "tau": verdict.tau,
        "candidates_evaluated": verdict.candidates_evaluated,
        "retrieval": retrieval_summary(passages),
    });
    if let Some(best) = &verdict.best {
        debug["delta"] = json!(best.delta);
        debug["s_best"] = json!(best.s_best);
        debug["s_null"] = json!(best.s_null);
        debug["best_span"] = json!(best.span_text);
    }
    if !verdict.failures.is_empty() {
        debug["extraction_failures"] = verdict
            .failures
            .iter()
            .map(|f| json!({ "doc_id": f.doc_id, "chunk_idx": f.chunk_idx, "error": f.error.to_string() }))
            .collect();
    }

    let mut citations = verdict.citations;
    citations.truncate(MAX_CITATIONS);

    AnswerPayload {
        action: verdict.action,
        answer: verdict.answer,
        citations,
        answer_confidence: verdict.confidence,
        notes: notes.to_string(),
        debug_info: debug,
    }
}
