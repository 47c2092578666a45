//! Abstain-aware extractive QA over retrieved passages.
//!
//! For each passage the reader scores its best span against the null hypothesis.
//! `delta = s_null - s_best`; the passage with the smallest delta wins, and the query
//! abstains when that delta reaches `tau`.

use std::sync::Arc;

use sfq_core::error::{codes, AppError};

use crate::payload::{truncate_quote, AnswerAction, Citation};
use crate::reader::{SpanLogits, SpanModel};
use crate::retrieve::RetrievedPassage;

pub const REASON_NO_VALID_SPANS: &str = "no_valid_spans";
pub const REASON_ABSTAIN: &str = "abstain";
pub const REASON_ANSWERED: &str = "answered";

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    pub passage: RetrievedPassage,
    pub start_idx: usize,
    pub end_idx: usize,
    pub span_text: String,
    pub s_best: f64,
    pub s_null: f64,
    pub delta: f64,
}

/// A passage the reader could not score. Recorded, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageFailure {
    pub doc_id: String,
    pub chunk_idx: u32,
    pub error: AppError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionVerdict {
    pub action: AnswerAction,
    pub answer: String,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub reason: &'static str,
    pub tau: f64,
    pub best: Option<ExtractionCandidate>,
    pub candidates_evaluated: usize,
    pub failures: Vec<PassageFailure>,
}

/// `1 / (1 + max(0, delta))`.
pub fn confidence_from_delta(delta: f64) -> f64 {
    1.0 / (1.0 + delta.max(0.0))
}

fn argmax_from_one(v: &[f32]) -> usize {
    let mut best = 1;
    for i in 2..v.len() {
        if v[i] > v[best] {
            best = i;
        }
    }
    best
}

fn malformed(details: impl Into<String>) -> AppError {
    AppError::new(codes::EXTRACTION_FAILED, "Malformed reader output").with_details(details)
}

// Slice of the context covered by tokens start_idx..=end_idx, skipping tokens without offsets.
fn decode_span(context: &str, logits: &SpanLogits, start_idx: usize, end_idx: usize) -> Result<String, AppError> {
    let covered: Vec<(usize, usize)> = logits.offsets[start_idx..=end_idx]
        .iter()
        .flatten()
        .copied()
        .filter(|(s, e)| s < e)
        .collect();
    let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
        return Ok(String::new());
    };
    let (s, e) = (first.0, last.1.max(first.1));
    context
        .get(s..e)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| malformed(format!("offsets {s}..{e} outside context of {} bytes", context.len())))
}

/// Score one (question, passage) pair into a candidate.
pub fn score_passage(
    model: &dyn SpanModel,
    question: &str,
    passage: &RetrievedPassage,
) -> Result<ExtractionCandidate, AppError> {
    let context = passage.chunk.text.as_str();
    let logits = model.predict(question, context).map_err(|e| {
        AppError::new(codes::EXTRACTION_FAILED, "Reader prediction failed")
            .with_details(e.to_string())
            .with_retryable(e.retryable)
    })?;

    let n = logits.start_logits.len();
    if n < 2 || logits.end_logits.len() != n || logits.offsets.len() != n {
        return Err(malformed(format!(
            "start={}; end={}; offsets={}",
            n,
            logits.end_logits.len(),
            logits.offsets.len()
        )));
    }
    if logits
        .start_logits
        .iter()
        .chain(logits.end_logits.iter())
        .any(|x| !x.is_finite())
    {
        return Err(malformed("non-finite logits"));
    }

    let start_idx = argmax_from_one(&logits.start_logits);
    let end_idx = argmax_from_one(&logits.end_logits).max(start_idx);
    let s_best = f64::from(logits.start_logits[start_idx]) + f64::from(logits.end_logits[end_idx]);
    let s_null = f64::from(logits.start_logits[0]) + f64::from(logits.end_logits[0]);
    let span_text = decode_span(context, &logits, start_idx, end_idx)?;

    Ok(ExtractionCandidate {
        passage: passage.clone(),
        start_idx,
        end_idx,
        span_text,
        s_best,
        s_null,
        delta: s_null - s_best,
    })
}

pub struct SpanExtractor {
    model: Arc<dyn SpanModel>,
}

impl SpanExtractor {
    pub fn new(model: Arc<dyn SpanModel>) -> Self {
        Self { model }
    }

    pub fn decide(&self, question: &str, passages: &[RetrievedPassage], tau: f64) -> ExtractionVerdict {
        let mut candidates = Vec::with_capacity(passages.len());
        let mut failures = Vec::new();
        for p in passages {
            match score_passage(self.model.as_ref(), question, p) {
                Ok(c) => candidates.push(c),
                Err(error) => {
                    tracing::warn!(
                        doc_id = %p.chunk.doc_id,
                        chunk_idx = p.chunk.chunk_idx,
                        error = %error,
                        "extraction failed for passage"
                    );
                    failures.push(PassageFailure {
                        doc_id: p.chunk.doc_id.clone(),
                        chunk_idx: p.chunk.chunk_idx,
                        error,
                    });
                }
            }
        }
        decide_from_candidates(candidates, failures, tau)
    }
}

/// Pick the winner and render the verdict. The first candidate wins ties.
///
/// Candidates whose decoded span is empty are dropped before ranking, so a confident
/// empty span cannot shadow a weaker non-empty one. `no_valid_spans` means nothing
/// non-empty was decoded at all.
pub fn decide_from_candidates(
    candidates: Vec<ExtractionCandidate>,
    failures: Vec<PassageFailure>,
    tau: f64,
) -> ExtractionVerdict {
    let candidates_evaluated = candidates.len();
    let best = candidates
        .into_iter()
        .filter(|c| !c.span_text.is_empty())
        .fold(None::<ExtractionCandidate>, |acc, c| match acc {
            Some(b) if b.delta <= c.delta => Some(b),
            _ => Some(c),
        });

    let Some(best) = best else {
        return ExtractionVerdict {
            action: AnswerAction::Flag,
            answer: String::new(),
            confidence: 0.0,
            citations: Vec::new(),
            reason: REASON_NO_VALID_SPANS,
            tau,
            best: None,
            candidates_evaluated,
            failures,
        };
    };

    let confidence = confidence_from_delta(best.delta);
    if best.delta >= tau {
        return ExtractionVerdict {
            action: AnswerAction::Flag,
            answer: String::new(),
            confidence,
            citations: Vec::new(),
            reason: REASON_ABSTAIN,
            tau,
            best: Some(best),
            candidates_evaluated,
            failures,
        };
    }

    let chunk = &best.passage.chunk;
    let citation = Citation {
        doc_id: chunk.doc_id.clone(),
        section: chunk.section.clone(),
        quote: truncate_quote(&best.span_text),
        chunk_idx: Some(chunk.chunk_idx),
        start: Some(chunk.start),
        end: Some(chunk.end),
        retrieval_distance: Some(f64::from(best.passage.distance)),
    };
    ExtractionVerdict {
        action: AnswerAction::Answer,
        answer: best.span_text.clone(),
        confidence,
        citations: vec![citation],
        reason: REASON_ANSWERED,
        tau,
        best: Some(best),
        candidates_evaluated,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Chunk;

    fn passage(text: &str) -> RetrievedPassage {
        RetrievedPassage {
            chunk: Chunk {
                doc_id: "crypto.md".to_string(),
                chunk_idx: 0,
                start: 0,
                end: text.chars().count(),
                text: text.to_string(),
                section: "Encryption".to_string(),
                embedding: vec![1.0],
            },
            distance: 0.1,
        }
    }

    struct Fixed(SpanLogits);

    impl SpanModel for Fixed {
        fn predict(&self, _q: &str, _c: &str) -> Result<SpanLogits, AppError> {
            Ok(self.0.clone())
        }
        fn warmup(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[test]
    fn argmax_ignores_null_position_and_clamps_end() {
        // Tokens: [null, "Data"(0..4), "is"(5..7), "encrypted"(8..17)]
        let logits = SpanLogits {
            start_logits: vec![9.0, 0.0, 1.0, 5.0],
            end_logits: vec![9.0, 4.0, 0.0, 1.0],
            offsets: vec![None, Some((0, 4)), Some((5, 7)), Some((8, 17))],
        };
        let c = score_passage(&Fixed(logits), "q", &passage("Data is encrypted")).unwrap();
        assert_eq!((c.start_idx, c.end_idx), (3, 3));
        assert_eq!(c.span_text, "encrypted");
        assert_eq!(c.s_null, 18.0);
        assert_eq!(c.s_best, 6.0);
        assert_eq!(c.delta, 12.0);
    }

    #[test]
    fn rejects_offsets_outside_context() {
        let logits = SpanLogits {
            start_logits: vec![0.0, 1.0],
            end_logits: vec![0.0, 1.0],
            offsets: vec![None, Some((0, 99))],
        };
        let err = score_passage(&Fixed(logits), "q", &passage("short")).unwrap_err();
        assert_eq!(err.code, codes::EXTRACTION_FAILED);
    }

    #[test]
    fn span_of_only_special_tokens_is_empty() {
        let logits = SpanLogits {
            start_logits: vec![0.0, 3.0, 0.0],
            end_logits: vec![0.0, 3.0, 0.0],
            offsets: vec![None, None, Some((0, 4))],
        };
        let c = score_passage(&Fixed(logits), "q", &passage("Data")).unwrap();
        assert_eq!(c.span_text, "");
        let v = decide_from_candidates(vec![c], Vec::new(), 10.0);
        assert_eq!(v.reason, REASON_NO_VALID_SPANS);
        assert_eq!(v.confidence, 0.0);
    }
}
