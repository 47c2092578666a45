use serde::{Deserialize, Serialize};

/// Pipeline state of a question. `Final` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Answering,
    Review,
    Retrying,
    Risk,
    Final,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Answering => "answering",
            QuestionStatus::Review => "review",
            QuestionStatus::Retrying => "retrying",
            QuestionStatus::Risk => "risk",
            QuestionStatus::Final => "final",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "answering" => Some(Self::Answering),
            "review" => Some(Self::Review),
            "retrying" => Some(Self::Retrying),
            "risk" => Some(Self::Risk),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Answer,
    NeedsInfo,
}

impl FinalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalDecision::Answer => "answer",
            FinalDecision::NeedsInfo => "needs_info",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "answer" => Some(Self::Answer),
            "needs_info" => Some(Self::NeedsInfo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStage {
    Answering,
    AnsweringRetry,
    Review,
    Risk,
}

impl ArtifactStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStage::Answering => "answering",
            ArtifactStage::AnsweringRetry => "answering_retry",
            ArtifactStage::Review => "review",
            ArtifactStage::Risk => "risk",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "answering" => Some(Self::Answering),
            "answering_retry" => Some(Self::AnsweringRetry),
            "review" => Some(Self::Review),
            "risk" => Some(Self::Risk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: i64,
    pub session_id: Option<String>,
    pub created_at: String, // RFC3339
}

/// A questionnaire question and its pipeline outcome.
///
/// Only the pipeline orchestrator mutates status, `final_decision`, `verify_conf` and
/// `risk_severity`. `verify_conf` is an integer percentage (0..=100).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    pub run_id: i64,
    pub text: String,
    pub status: QuestionStatus,
    #[serde(rename = "final")]
    pub final_decision: Option<FinalDecision>,
    pub verify_conf: i64,
    pub risk_severity: Severity,
    pub updated_at: String,
}

/// Append-only stage output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: i64,
    pub question_id: i64,
    pub stage: ArtifactStage,
    pub payload: serde_json::Value,
    pub latency_ms: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    NeedsInfo,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewVerdict::Approve => "approve",
            ReviewVerdict::NeedsInfo => "needs_info",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "needs_info" => Some(Self::NeedsInfo),
            _ => None,
        }
    }
}

/// A human reviewer's verdict on a finalized question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewDecision {
    pub id: i64,
    pub question_id: i64,
    pub decision: ReviewVerdict,
    pub reason: Option<String>,
    pub actor: String,
    pub created_at: String,
}
