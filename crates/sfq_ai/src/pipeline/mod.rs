//! Per-question state machine:
//! answering -> review -> (retrying -> review) -> risk -> final.
//!
//! - At most one retry, triggered only by the first-pass verification confidence.
//! - Every stage appends an artifact before the next stage starts.
//! - Events are best-effort; the artifact log is the durable record.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use sfq_core::domain::{ArtifactStage, FinalDecision, QuestionStatus, Severity};
use sfq_core::error::{codes, AppError};

use crate::agents::{AnswerPass, AnsweringAgent, RiskAgent, VerificationAgent};
use crate::config::PipelineConfig;
use crate::payload::{AnswerPayload, ReviewResult, RiskResult};

pub mod events;
pub mod proof;
pub mod store;

pub use events::{run_channel, ChannelSink, EventSink, QuestionEvent};
pub use proof::{proof_bundle, run_hash, ProofBundle};
pub use store::{PipelineStore, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThresholds {
    pub retry_below: f64,
    pub min_answer_confidence: f64,
    pub min_verification_conf: f64,
}

impl From<&PipelineConfig> for DecisionThresholds {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            retry_below: c.retry_below,
            min_answer_confidence: c.min_answer_confidence,
            min_verification_conf: c.min_verification_conf,
        }
    }
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// One answering pass and its review.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub pass: AnswerPass,
    pub answer: AnswerPayload,
    pub review: ReviewResult,
}

/// Index of the attempt to keep: a later attempt replaces the kept one only when its
/// verification confidence is strictly greater.
pub fn select_attempt(attempts: &[Attempt]) -> usize {
    let mut best = 0;
    for (i, a) in attempts.iter().enumerate().skip(1) {
        if a.review.verification_conf > attempts[best].review.verification_conf {
            best = i;
        }
    }
    best
}

pub fn decide(
    answer_confidence: f64,
    verification_conf: f64,
    risk: &RiskResult,
    t: &DecisionThresholds,
) -> FinalDecision {
    if answer_confidence >= t.min_answer_confidence
        && verification_conf >= t.min_verification_conf
        && risk.severity != Severity::High
        && !risk.needs_human
    {
        FinalDecision::Answer
    } else {
        FinalDecision::NeedsInfo
    }
}

/// Integer percent as stored on the question.
pub fn verify_conf_percent(verification_conf: f64) -> i64 {
    (verification_conf * 100.0).round().clamp(0.0, 100.0) as i64
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub run_id: i64,
    pub question_id: i64,
    pub attempts: Vec<Attempt>,
    pub selected: usize,
    pub risk: RiskResult,
    pub decision: FinalDecision,
    pub verify_conf: i64,
    pub bundle: ProofBundle,
}

impl QuestionOutcome {
    pub fn selected_attempt(&self) -> &Attempt {
        &self.attempts[self.selected]
    }

    pub fn retried(&self) -> bool {
        self.attempts.len() > 1
    }
}

fn elapsed_ms(t0: Instant) -> i64 {
    t0.elapsed().as_millis().min(i64::MAX as u128) as i64
}

fn to_payload(v: &impl serde::Serialize) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(v).map_err(|e| {
        AppError::new("PIPELINE_PAYLOAD_INVALID", "Failed to encode stage payload").with_details(e.to_string())
    })
}

pub struct PipelineOrchestrator {
    answering: Arc<AnsweringAgent>,
    verification: VerificationAgent,
    risk: RiskAgent,
    store: Arc<dyn PipelineStore>,
    events: Arc<dyn EventSink>,
    thresholds: DecisionThresholds,
}

impl PipelineOrchestrator {
    pub fn new(
        answering: Arc<AnsweringAgent>,
        store: Arc<dyn PipelineStore>,
        events: Arc<dyn EventSink>,
        thresholds: DecisionThresholds,
    ) -> Self {
        Self {
            answering,
            verification: VerificationAgent,
            risk: RiskAgent,
            store,
            events,
            thresholds,
        }
    }

    fn emit(&self, event: QuestionEvent) {
        self.events.publish(&run_channel(event.run_id), &event);
    }

    fn attempt(&self, question_id: i64, text: &str, pass: AnswerPass) -> Result<Attempt, AppError> {
        let stage = match pass {
            AnswerPass::First => ArtifactStage::Answering,
            AnswerPass::Second => ArtifactStage::AnsweringRetry,
        };
        let t0 = Instant::now();
        let answer = self.answering.answer_pass(text, pass)?;
        self.store
            .append_artifact(question_id, stage, &to_payload(&answer)?, elapsed_ms(t0))?;
        if pass == AnswerPass::First {
            // The retry keeps `retrying` through its own review.
            self.store.set_status(question_id, QuestionStatus::Review)?;
        }

        let t1 = Instant::now();
        let review = self.verification.review(&answer);
        self.store
            .append_artifact(question_id, ArtifactStage::Review, &to_payload(&review)?, elapsed_ms(t1))?;
        Ok(Attempt { pass, answer, review })
    }

    /// Drive one question to `final`. A question already `final` is refused.
    pub fn process_question(&self, run_id: i64, question_id: i64) -> Result<QuestionOutcome, AppError> {
        let question = self.store.get_question(question_id)?;
        if question.run_id != run_id {
            return Err(AppError::new("PIPELINE_RUN_MISMATCH", "Question does not belong to run")
                .with_details(format!("run_id={run_id}; question_id={question_id}; actual_run_id={}", question.run_id)));
        }
        if question.status == QuestionStatus::Final {
            return Err(AppError::new(codes::PIPELINE_ALREADY_FINAL, "Question is already final")
                .with_details(format!("question_id={question_id}")));
        }

        self.store.set_status(question_id, QuestionStatus::Answering)?;
        self.emit(QuestionEvent::new(run_id, question_id, "answering", "answering"));

        let mut attempts = Vec::with_capacity(2);
        let first = self.attempt(question_id, &question.text, AnswerPass::First)?;
        self.emit(
            QuestionEvent::new(run_id, question_id, "review", "reviewed")
                .with_metrics(json!({ "verification_conf": first.review.verification_conf })),
        );
        let retry = first.review.verification_conf < self.thresholds.retry_below;
        attempts.push(first);

        if retry {
            self.store.set_status(question_id, QuestionStatus::Retrying)?;
            self.emit(QuestionEvent::new(run_id, question_id, "answering", "retrying"));
            let second = self.attempt(question_id, &question.text, AnswerPass::Second)?;
            self.emit(
                QuestionEvent::new(run_id, question_id, "review", "reviewed").with_metrics(json!({
                    "verification_conf": second.review.verification_conf,
                    "retry": true,
                })),
            );
            attempts.push(second);
        }

        let selected = select_attempt(&attempts);
        let Attempt { answer, review, .. } = &attempts[selected];

        self.store.set_status(question_id, QuestionStatus::Risk)?;
        let t2 = Instant::now();
        let risk = self.risk.assess(answer);
        self.store
            .append_artifact(question_id, ArtifactStage::Risk, &to_payload(&risk)?, elapsed_ms(t2))?;
        self.emit(
            QuestionEvent::new(run_id, question_id, "risk", "risked")
                .with_metrics(json!({ "severity": risk.severity.as_str() })),
        );

        let decision = decide(answer.answer_confidence, review.verification_conf, &risk, &self.thresholds);
        let verify_conf = verify_conf_percent(review.verification_conf);
        self.store
            .finalize(question_id, decision, verify_conf, risk.severity)?;

        let bundle = proof_bundle(decision, answer, review, &risk)?;
        self.emit(QuestionEvent::new(run_id, question_id, "final", "final").with_payload(to_payload(&bundle)?));

        tracing::info!(
            run_id,
            question_id,
            decision = decision.as_str(),
            verify_conf,
            severity = risk.severity.as_str(),
            retried = attempts.len() > 1,
            run_hash = %bundle.proof.run_hash,
            "question finalized"
        );

        Ok(QuestionOutcome {
            run_id,
            question_id,
            attempts,
            selected,
            risk,
            decision,
            verify_conf,
            bundle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::AnswerAction;

    fn risk(severity: Severity, needs_human: bool) -> RiskResult {
        RiskResult {
            category: "compliance".into(),
            severity,
            needs_human,
            reason: "test".into(),
        }
    }

    fn attempt(conf: f64) -> Attempt {
        Attempt {
            pass: AnswerPass::First,
            answer: AnswerPayload {
                action: AnswerAction::Flag,
                answer: String::new(),
                citations: Vec::new(),
                answer_confidence: 0.0,
                notes: String::new(),
                debug_info: serde_json::Value::Null,
            },
            review: ReviewResult {
                verification_conf: conf,
                defects: Vec::new(),
                fixed_answer: None,
            },
        }
    }

    #[test]
    fn decision_table() {
        let t = DecisionThresholds::default();
        assert_eq!(decide(0.9, 0.95, &risk(Severity::Low, false), &t), FinalDecision::Answer);
        assert_eq!(decide(0.9, 0.95, &risk(Severity::High, true), &t), FinalDecision::NeedsInfo);
        assert_eq!(decide(0.9, 0.95, &risk(Severity::Medium, true), &t), FinalDecision::NeedsInfo);
        assert_eq!(decide(0.64, 0.95, &risk(Severity::Low, false), &t), FinalDecision::NeedsInfo);
        assert_eq!(decide(0.65, 0.70, &risk(Severity::Medium, false), &t), FinalDecision::Answer);
    }

    #[test]
    fn retry_replaces_only_when_strictly_better() {
        assert_eq!(select_attempt(&[attempt(0.5), attempt(0.5)]), 0);
        assert_eq!(select_attempt(&[attempt(0.5), attempt(0.51)]), 1);
        assert_eq!(select_attempt(&[attempt(0.6), attempt(0.3)]), 0);
    }

    #[test]
    fn verify_conf_rounds_to_percent() {
        assert_eq!(verify_conf_percent(0.696), 70);
        assert_eq!(verify_conf_percent(0.3), 30);
        assert_eq!(verify_conf_percent(1.0), 100);
    }
}
