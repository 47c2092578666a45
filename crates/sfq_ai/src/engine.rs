//! Facade wiring the engine together from one [`SafeFormsConfig`].

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sfq_core::approvals::{
    ApprovalLedger, SessionReview, Suggestion, SuggestionInput, SuggestionStatusView, SubmitResult, VoteDecision,
};
use sfq_core::domain::{Artifact, FinalDecision, Question, QuestionStatus, ReviewDecision, ReviewVerdict, Run};
use sfq_core::error::AppError;
use sfq_core::questionnaire::load_questionnaire_dir;
use sfq_core::tokens::{TokenAuthenticator, TokenClaims};

use crate::agents::AnsweringAgent;
use crate::config::SafeFormsConfig;
use crate::corpus::{Corpus, DirectoryCorpus};
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::extract::SpanExtractor;
use crate::index::{ChunkIndexer, IndexBuildReport};
use crate::local::LocalClient;
use crate::payload::AnswerPayload;
use crate::pipeline::{ChannelSink, DecisionThresholds, PipelineOrchestrator, QuestionOutcome, SqliteStore};
use crate::reader::{HttpSpanModel, SpanModel};
use crate::retrieve::DenseRetriever;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NotReady,
    IndexReady,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub embedding_model: String,
    pub reader_model: Option<String>,
    pub indexed_chunks: Option<usize>,
    pub error: Option<String>,
}

/// Result for one question of a batch. Failures stay per question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchItem {
    pub question_id: i64,
    pub decision: Option<FinalDecision>,
    pub verify_conf: Option<i64>,
    pub run_hash: Option<String>,
    pub error: Option<AppError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub run_id: i64,
    pub items: Vec<BatchItem>,
}

/// Externally constructed collaborators. Tests inject mocks here.
pub struct EngineParts {
    pub corpus: Arc<dyn Corpus>,
    pub embedder: Arc<dyn Embedder>,
    pub reader: Arc<dyn SpanModel>,
    pub store: Arc<SqliteStore>,
}

pub struct Engine {
    config: SafeFormsConfig,
    indexer: Arc<ChunkIndexer>,
    answering: Arc<AnsweringAgent>,
    reader: Arc<dyn SpanModel>,
    orchestrator: PipelineOrchestrator,
    store: Arc<SqliteStore>,
    events: Arc<ChannelSink>,
    ledger: ApprovalLedger,
    tokens: TokenAuthenticator,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// Local HTTP model clients, the policy directory and the SQLite file from `config`.
    pub fn from_config(config: SafeFormsConfig) -> Result<Self, AppError> {
        config.validate()?;
        let embedder = OllamaEmbedder::new(LocalClient::new(&config.models.base_url)?);
        let reader = HttpSpanModel::new(LocalClient::new(&config.models.reader_url)?, config.reader.model.clone());
        let parts = EngineParts {
            corpus: Arc::new(DirectoryCorpus::new(config.corpus.policy_dir.clone())),
            embedder: Arc::new(embedder),
            reader: Arc::new(reader),
            store: Arc::new(SqliteStore::open(&config.database.path)?),
        };
        Self::with_parts(config, parts)
    }

    pub fn with_parts(config: SafeFormsConfig, parts: EngineParts) -> Result<Self, AppError> {
        config.validate()?;
        let indexer = Arc::new(ChunkIndexer::new(&config.index, parts.corpus, parts.embedder.clone()));
        let retriever = Arc::new(DenseRetriever::new(
            indexer.clone(),
            parts.embedder,
            config.retrieval.max_distance,
        ));
        let extractor = Arc::new(SpanExtractor::new(parts.reader.clone()));
        let answering = Arc::new(AnsweringAgent::new(
            retriever,
            extractor,
            config.retrieval.top_k,
            config.reader.first_pass_tau,
            config.reader.second_pass_tau,
        ));
        let events = Arc::new(ChannelSink::new());
        let orchestrator = PipelineOrchestrator::new(
            answering.clone(),
            parts.store.clone(),
            events.clone(),
            DecisionThresholds::from(&config.pipeline),
        );
        let tokens = TokenAuthenticator::new(&config.tokens)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pipeline.workers)
            .thread_name(|i| format!("sfq-pipeline-{i}"))
            .build()
            .map_err(|e| {
                AppError::new("ENGINE_INIT_FAILED", "Failed to start pipeline worker pool")
                    .with_details(e.to_string())
            })?;

        Ok(Self {
            config,
            indexer,
            answering,
            reader: parts.reader,
            orchestrator,
            store: parts.store,
            events,
            ledger: ApprovalLedger::new(),
            tokens,
            pool,
        })
    }

    pub fn config(&self) -> &SafeFormsConfig {
        &self.config
    }

    pub fn events(&self) -> &ChannelSink {
        &self.events
    }

    pub fn ledger(&self) -> &ApprovalLedger {
        &self.ledger
    }

    pub fn build_index(&self, reset: bool) -> Result<IndexBuildReport, AppError> {
        self.indexer.build(reset)
    }

    pub fn answer(&self, question: &str, tau: f64) -> Result<AnswerPayload, AppError> {
        self.answering.answer(question, tau)
    }

    pub fn create_run(&self, session_id: Option<&str>, questions: &[String]) -> Result<(Run, Vec<Question>), AppError> {
        let (run, qs) = self.store.create_run(session_id, questions)?;
        tracing::info!(run_id = run.id, questions = qs.len(), "run created");
        Ok((run, qs))
    }

    /// One run holding every question of every `*.json` questionnaire in `dir`.
    pub fn create_run_from_dir(&self, session_id: Option<&str>, dir: &Path) -> Result<(Run, Vec<Question>), AppError> {
        let items = load_questionnaire_dir(dir)?;
        let texts: Vec<String> = items.into_iter().map(|i| i.text).collect();
        self.create_run(session_id, &texts)
    }

    pub fn process_question(&self, run_id: i64, question_id: i64) -> Result<QuestionOutcome, AppError> {
        self.orchestrator.process_question(run_id, question_id)
    }

    /// Process every non-final question of a run on the worker pool.
    pub fn run_batch(&self, run_id: i64) -> Result<BatchReport, AppError> {
        self.store.get_run(run_id)?;
        let pending: Vec<i64> = self
            .store
            .list_questions(run_id)?
            .into_iter()
            .filter(|q| q.status != QuestionStatus::Final)
            .map(|q| q.id)
            .collect();

        let items: Vec<BatchItem> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|&qid| match self.orchestrator.process_question(run_id, qid) {
                    Ok(o) => BatchItem {
                        question_id: qid,
                        decision: Some(o.decision),
                        verify_conf: Some(o.verify_conf),
                        run_hash: Some(o.bundle.proof.run_hash),
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(run_id, question_id = qid, error = %e, "question failed");
                        BatchItem {
                            question_id: qid,
                            decision: None,
                            verify_conf: None,
                            run_hash: None,
                            error: Some(e),
                        }
                    }
                })
                .collect()
        });
        Ok(BatchReport { run_id, items })
    }

    pub fn list_questions(&self, run_id: i64) -> Result<Vec<Question>, AppError> {
        self.store.list_questions(run_id)
    }

    pub fn list_artifacts(&self, question_id: i64) -> Result<Vec<Artifact>, AppError> {
        self.store.list_artifacts(question_id)
    }

    pub fn record_review_decision(
        &self,
        question_id: i64,
        decision: ReviewVerdict,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<ReviewDecision, AppError> {
        self.store.record_review_decision(question_id, decision, reason, actor)
    }

    pub fn list_review_decisions(&self, question_id: i64) -> Result<Vec<ReviewDecision>, AppError> {
        self.store.list_review_decisions(question_id)
    }

    pub fn warmup(&self) -> Result<(), AppError> {
        self.reader.warmup()
    }

    /// Fast mode only checks for an index and never touches the reader model.
    pub fn health(&self, deep: bool) -> HealthReport {
        let mut report = HealthReport {
            status: HealthStatus::NotReady,
            embedding_model: self.indexer.embedding_model().to_string(),
            reader_model: None,
            indexed_chunks: None,
            error: None,
        };
        if !self.indexer.is_present() {
            report.error = Some("Index not found".to_string());
            return report;
        }
        if !deep {
            report.status = HealthStatus::IndexReady;
            return report;
        }

        let checked = self.indexer.current().and_then(|snapshot| {
            let snapshot = snapshot.ok_or_else(|| AppError::new("INDEX_LOAD_FAILED", "Index disappeared while loading"))?;
            self.reader.warmup()?;
            Ok(snapshot.chunks.len())
        });
        match checked {
            Ok(count) => {
                report.status = HealthStatus::Ready;
                report.indexed_chunks = Some(count);
                report.reader_model = Some(self.config.reader.model.clone());
            }
            Err(e) => {
                report.status = HealthStatus::Error;
                report.error = Some(e.to_string());
            }
        }
        report
    }

    pub fn issue_token(&self, session_id: &str, approver_email: &str, ttl_secs: Option<i64>) -> Result<String, AppError> {
        self.tokens.issue(session_id, approver_email, ttl_secs)
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AppError> {
        self.tokens.verify(token)
    }

    pub fn upsert_suggestions(&self, session_id: &str, items: &[SuggestionInput]) -> Result<usize, AppError> {
        self.ledger.upsert_suggestions(session_id, items)
    }

    pub fn record_vote(&self, session_id: &str, suggestion_id: &str, approver: &str, accept: bool) -> Result<(), AppError> {
        self.ledger.record_vote(session_id, suggestion_id, approver, accept)
    }

    pub fn list_suggestions(&self, session_id: &str) -> Vec<Suggestion> {
        self.ledger.list_suggestions(session_id)
    }

    pub fn suggestion_status(&self, session_id: &str, required: &[String]) -> Vec<SuggestionStatusView> {
        self.ledger.status(session_id, required)
    }

    pub fn review_session(&self, token: &str) -> Result<SessionReview, AppError> {
        self.ledger.review_session(&self.tokens, token)
    }

    pub fn submit_decisions(&self, token: &str, decisions: &[VoteDecision]) -> Result<SubmitResult, AppError> {
        let res = self.ledger.submit_decisions(&self.tokens, token, decisions)?;
        tracing::info!(session_id = %res.session_id, approver = %res.approver, updated = res.updated, "approval decisions recorded");
        Ok(res)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("index_dir", &self.config.index.index_dir)
            .field("workers", &self.config.pipeline.workers)
            .field("tokens", &self.tokens)
            .finish()
    }
}
