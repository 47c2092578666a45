//! Per-session approval ledger for answer suggestions.
//!
//! - Votes are keyed by approver identity; a vote replaces that approver's opposite vote.
//! - Quorum status is derived on read and never stored.
//! - All mutations go through one ledger-wide mutex; reads copy out a snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::tokens::TokenAuthenticator;

const MAX_SUGGESTION_ID_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestion {
    pub id: String,
    pub text: String,
    pub accepted_by: BTreeSet<String>,
    pub rejected_by: BTreeSet<String>,
}

/// Identity under which votes are stored and quorum is checked.
fn approver_key(approver: &str) -> &str {
    approver.trim()
}

impl Suggestion {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: String::new(),
            accepted_by: BTreeSet::new(),
            rejected_by: BTreeSet::new(),
        }
    }

    /// Quorum over `required`. An empty requirement is never vacuously accepted.
    pub fn status(&self, required: &[String]) -> SuggestionStatus {
        let required: Vec<&str> = required
            .iter()
            .map(|a| approver_key(a))
            .filter(|a| !a.is_empty())
            .collect();
        if required.is_empty() {
            return SuggestionStatus::Pending;
        }
        if required.iter().any(|a| self.rejected_by.contains(*a)) {
            return SuggestionStatus::Rejected;
        }
        if required.iter().all(|a| self.accepted_by.contains(*a)) {
            return SuggestionStatus::Accepted;
        }
        SuggestionStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestionInput {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestionStatusView {
    pub id: String,
    pub status: SuggestionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteDecision {
    pub suggestion_id: String,
    pub accept: bool,
}

/// What an approver sees after presenting a valid token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionReview {
    pub session_id: String,
    pub approver: String,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResult {
    pub session_id: String,
    pub approver: String,
    pub updated: usize,
}

type SessionMap = BTreeMap<String, BTreeMap<String, Suggestion>>;

#[derive(Debug, Default)]
pub struct ApprovalLedger {
    sessions: Mutex<SessionMap>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Create or update suggestion text. Vote sets are never touched.
    pub fn upsert_suggestions(
        &self,
        session_id: &str,
        items: &[SuggestionInput],
    ) -> Result<usize, AppError> {
        validate_session_id(session_id)?;
        for it in items {
            validate_suggestion_id(&it.id)?;
        }

        let mut sessions = self.lock();
        let session = sessions.entry(session_id.to_string()).or_default();
        for it in items {
            session
                .entry(it.id.clone())
                .or_insert_with(|| Suggestion::empty(&it.id))
                .text = it.text.clone();
        }
        Ok(items.len())
    }

    /// Record one approver's vote. Unknown suggestions are created with empty text.
    pub fn record_vote(
        &self,
        session_id: &str,
        suggestion_id: &str,
        approver: &str,
        accept: bool,
    ) -> Result<(), AppError> {
        validate_session_id(session_id)?;
        validate_suggestion_id(suggestion_id)?;
        let approver = approver_key(approver);
        if approver.is_empty() {
            return Err(AppError::new("APPROVAL_INVALID", "Approver identity is required"));
        }

        let mut sessions = self.lock();
        let suggestion = sessions
            .entry(session_id.to_string())
            .or_default()
            .entry(suggestion_id.to_string())
            .or_insert_with(|| Suggestion::empty(suggestion_id));
        if accept {
            suggestion.rejected_by.remove(approver);
            suggestion.accepted_by.insert(approver.to_string());
        } else {
            suggestion.accepted_by.remove(approver);
            suggestion.rejected_by.insert(approver.to_string());
        }
        tracing::debug!(session_id, suggestion_id, approver, accept, "recorded approval vote");
        Ok(())
    }

    /// Snapshot of a session's suggestions ordered by id. Unknown sessions are empty.
    pub fn list_suggestions(&self, session_id: &str) -> Vec<Suggestion> {
        self.lock()
            .get(session_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn status(&self, session_id: &str, required: &[String]) -> Vec<SuggestionStatusView> {
        self.list_suggestions(session_id)
            .iter()
            .map(|s| SuggestionStatusView {
                id: s.id.clone(),
                status: s.status(required),
            })
            .collect()
    }

    /// Resolve the token's session and approver, then list that session.
    pub fn review_session(
        &self,
        auth: &TokenAuthenticator,
        token: &str,
    ) -> Result<SessionReview, AppError> {
        let claims = auth.verify(token)?;
        let suggestions = self.list_suggestions(&claims.session_id);
        Ok(SessionReview {
            session_id: claims.session_id,
            approver: claims.approver_email,
            suggestions,
        })
    }

    /// Apply a batch of votes as the token's approver.
    ///
    /// Every decision is validated before any is applied, so a bad id leaves the ledger untouched.
    pub fn submit_decisions(
        &self,
        auth: &TokenAuthenticator,
        token: &str,
        decisions: &[VoteDecision],
    ) -> Result<SubmitResult, AppError> {
        let claims = auth.verify(token)?;
        for d in decisions {
            validate_suggestion_id(&d.suggestion_id)?;
        }
        for d in decisions {
            self.record_vote(
                &claims.session_id,
                &d.suggestion_id,
                &claims.approver_email,
                d.accept,
            )?;
        }
        Ok(SubmitResult {
            session_id: claims.session_id,
            approver: claims.approver_email,
            updated: decisions.len(),
        })
    }
}

fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::new("APPROVAL_INVALID", "Session id is required"));
    }
    Ok(())
}

fn validate_suggestion_id(id: &str) -> Result<(), AppError> {
    if id.is_empty() || id.len() > MAX_SUGGESTION_ID_LEN {
        return Err(AppError::new(
            "APPROVAL_INVALID",
            "Suggestion id must be 1 to 200 bytes",
        )
        .with_details(format!("len={}", id.len())));
    }
    Ok(())
}
