use sfq_core::domain::Severity;

use crate::payload::{AnswerPayload, RiskResult};

const SENSITIVE_TERMS: [&str; 5] = ["pii", "ssn", "credit card", "hipaa", "gdpr"];
const CONTRADICTION_TERMS: [&str; 2] = ["not compliant", "cannot"];

/// Keyword heuristics over the answer text. High always wins over medium.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAgent;

impl RiskAgent {
    pub fn assess(&self, answer: &AnswerPayload) -> RiskResult {
        let text = answer.answer.to_lowercase();
        let (severity, needs_human, reason) = if CONTRADICTION_TERMS.iter().any(|t| text.contains(t)) {
            (Severity::High, true, "potential contradiction or non-compliance")
        } else if SENSITIVE_TERMS.iter().any(|t| text.contains(t)) {
            (Severity::Medium, false, "mentions sensitive data handling")
        } else {
            (Severity::Low, false, "baseline")
        };
        RiskResult {
            category: "compliance".to_string(),
            severity,
            needs_human,
            reason: reason.to_string(),
        }
    }
}
