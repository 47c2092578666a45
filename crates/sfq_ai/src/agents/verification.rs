use crate::payload::{AnswerPayload, Defect, ReviewResult};

const CITATION_BONUS: f64 = 0.15;
const EMPTY_ANSWER_CAP: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationAgent;

impl VerificationAgent {
    pub fn review(&self, answer: &AnswerPayload) -> ReviewResult {
        let bonus = if answer.citations.is_empty() { 0.0 } else { CITATION_BONUS };
        let mut verification_conf = (answer.answer_confidence + bonus).clamp(0.0, 1.0);
        let mut defects = Vec::new();
        if answer.answer.trim().is_empty() {
            defects.push(Defect {
                kind: "missing_citation".to_string(),
                evidence: "empty answer".to_string(),
            });
            verification_conf = verification_conf.min(EMPTY_ANSWER_CAP);
        }
        ReviewResult {
            verification_conf,
            defects,
            fixed_answer: None,
        }
    }
}
