use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use sfq_core::db;
use sfq_core::domain::{
    Artifact, ArtifactStage, FinalDecision, Question, QuestionStatus, ReviewDecision, ReviewVerdict, Run,
    Severity,
};
use sfq_core::error::AppError;
use sfq_core::repo;

/// What the orchestrator needs from persistence.
pub trait PipelineStore: Send + Sync {
    fn get_question(&self, question_id: i64) -> Result<Question, AppError>;
    fn set_status(&self, question_id: i64, status: QuestionStatus) -> Result<(), AppError>;
    fn append_artifact(
        &self,
        question_id: i64,
        stage: ArtifactStage,
        payload: &serde_json::Value,
        latency_ms: i64,
    ) -> Result<(), AppError>;
    fn finalize(
        &self,
        question_id: i64,
        decision: FinalDecision,
        verify_conf: i64,
        severity: Severity,
    ) -> Result<(), AppError>;
}

/// SQLite-backed store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::new("DB_LOCK_POISONED", "Database connection lock poisoned"))
    }

    pub fn create_run(&self, session_id: Option<&str>, questions: &[String]) -> Result<(Run, Vec<Question>), AppError> {
        repo::create_run(&mut *self.lock()?, session_id, questions)
    }

    pub fn get_run(&self, run_id: i64) -> Result<Run, AppError> {
        repo::get_run(&*self.lock()?, run_id)
    }

    pub fn list_questions(&self, run_id: i64) -> Result<Vec<Question>, AppError> {
        repo::list_questions(&*self.lock()?, run_id)
    }

    pub fn list_artifacts(&self, question_id: i64) -> Result<Vec<Artifact>, AppError> {
        repo::list_artifacts(&*self.lock()?, question_id)
    }

    pub fn record_review_decision(
        &self,
        question_id: i64,
        decision: ReviewVerdict,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<ReviewDecision, AppError> {
        repo::record_review_decision(&*self.lock()?, question_id, decision, reason, actor)
    }

    pub fn list_review_decisions(&self, question_id: i64) -> Result<Vec<ReviewDecision>, AppError> {
        repo::list_review_decisions(&*self.lock()?, question_id)
    }
}

impl PipelineStore for SqliteStore {
    fn get_question(&self, question_id: i64) -> Result<Question, AppError> {
        repo::get_question(&*self.lock()?, question_id)
    }

    fn set_status(&self, question_id: i64, status: QuestionStatus) -> Result<(), AppError> {
        repo::set_question_status(&*self.lock()?, question_id, status)
    }

    fn append_artifact(
        &self,
        question_id: i64,
        stage: ArtifactStage,
        payload: &serde_json::Value,
        latency_ms: i64,
    ) -> Result<(), AppError> {
        repo::append_artifact(&*self.lock()?, question_id, stage, payload, latency_ms).map(|_| ())
    }

    fn finalize(
        &self,
        question_id: i64,
        decision: FinalDecision,
        verify_conf: i64,
        severity: Severity,
    ) -> Result<(), AppError> {
        repo::finalize_question(&*self.lock()?, question_id, decision, verify_conf, severity)
    }
}
