use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sfq_ai::config::SafeFormsConfig;
use sfq_ai::corpus::{Corpus, Document};
use sfq_ai::embeddings::Embedder;
use sfq_ai::engine::{Engine, EngineParts, HealthStatus};
use sfq_ai::payload::AnswerAction;
use sfq_ai::pipeline::SqliteStore;
use sfq_ai::reader::{SpanLogits, SpanModel};
use sfq_core::approvals::{SuggestionInput, SuggestionStatus, VoteDecision};
use sfq_core::domain::{FinalDecision, QuestionStatus, ReviewVerdict};
use sfq_core::error::{codes, AppError};

struct RetentionPolicy;

impl Corpus for RetentionPolicy {
    fn list(&self) -> Result<Vec<Document>, AppError> {
        Ok(vec![Document {
            doc_id: "retention.md".to_string(),
            raw_text: "# Retention\nAudit logs are kept for 90 days.".to_string(),
        }])
    }
}

/// Anything mentioning logs points one way; everything else is the zero vector.
struct LogsEmbedder;

impl Embedder for LogsEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        if input.to_lowercase().contains("log") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0])
        }
    }
}

struct DaysReader {
    warmups: AtomicUsize,
    warmup_fails: bool,
}

impl DaysReader {
    fn new(warmup_fails: bool) -> Self {
        Self {
            warmups: AtomicUsize::new(0),
            warmup_fails,
        }
    }
}

impl SpanModel for DaysReader {
    fn predict(&self, _question: &str, context: &str) -> Result<SpanLogits, AppError> {
        let span = context
            .find("90 days")
            .map(|at| (at, at + "90 days".len()))
            .ok_or_else(|| AppError::new("TEST_READER", "phrase missing"))?;
        Ok(SpanLogits {
            start_logits: vec![4.0, 5.0],
            end_logits: vec![4.0, 5.0],
            offsets: vec![None, Some(span)],
        })
    }

    fn warmup(&self) -> Result<(), AppError> {
        self.warmups.fetch_add(1, Ordering::SeqCst);
        if self.warmup_fails {
            return Err(AppError::new("AI_MODEL_UNREACHABLE", "reader offline").with_retryable(true));
        }
        Ok(())
    }
}

fn engine(dir: &std::path::Path, reader: Arc<DaysReader>) -> Engine {
    let mut config = SafeFormsConfig::default();
    config.index.index_dir = dir.join("index");
    config.index.embedding_model = "mock".to_string();
    config.pipeline.workers = 2;
    config.tokens.secret = "engine-test-secret".to_string();
    Engine::with_parts(
        config,
        EngineParts {
            corpus: Arc::new(RetentionPolicy),
            embedder: Arc::new(LogsEmbedder),
            reader,
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
        },
    )
    .expect("engine")
}

#[test]
fn health_reports_each_readiness_level() {
    let dir = tempfile::tempdir().unwrap();
    let reader = Arc::new(DaysReader::new(false));
    let engine = engine(dir.path(), reader.clone());

    let h = engine.health(false);
    assert_eq!(h.status, HealthStatus::NotReady);
    assert_eq!(h.embedding_model, "mock");
    assert!(h.error.is_some());

    engine.build_index(false).unwrap();
    let h = engine.health(false);
    assert_eq!(h.status, HealthStatus::IndexReady);
    assert_eq!(reader.warmups.load(Ordering::SeqCst), 0);

    let h = engine.health(true);
    assert_eq!(h.status, HealthStatus::Ready);
    assert_eq!(h.indexed_chunks, Some(1));
    assert_eq!(h.reader_model.as_deref(), Some("deepset/roberta-base-squad2"));
    assert_eq!(reader.warmups.load(Ordering::SeqCst), 1);
}

#[test]
fn deep_health_surfaces_reader_failures() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(true)));
    engine.build_index(false).unwrap();

    let h = engine.health(true);
    assert_eq!(h.status, HealthStatus::Error);
    assert!(h.error.unwrap_or_default().contains("AI_MODEL_UNREACHABLE"));
    assert_eq!(engine.health(false).status, HealthStatus::IndexReady);
}

#[test]
fn unrelated_question_flags_with_no_passages() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));

    let payload = engine.answer("Who is the CISO?", 1.5).unwrap();
    assert_eq!(payload.action, AnswerAction::Flag);
    assert_eq!(payload.answer, "");
    assert!(payload.citations.is_empty());
    assert_eq!(payload.answer_confidence, 0.0);
    assert_eq!(payload.notes, "direct");
    assert_eq!(payload.debug_info["reason"], serde_json::json!("no_passages_found"));

    let payload = engine.answer("How long are audit logs kept?", 1.5).unwrap();
    assert_eq!(payload.action, AnswerAction::Answer);
    assert_eq!(payload.answer, "90 days");
    assert_eq!(payload.citations[0].doc_id, "retention.md");
}

#[test]
fn answer_rejects_unusable_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));
    for tau in [f64::NAN, f64::INFINITY, -0.5] {
        let err = engine.answer("How long are audit logs kept?", tau).unwrap_err();
        assert_eq!(err.code, codes::CONFIG_INVALID);
    }
    assert!(engine.answer("How long are audit logs kept?", 0.0).is_ok());
}

#[test]
fn batch_finalizes_every_question_and_skips_final_ones() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));
    let questions = vec![
        "How long are audit logs kept?".to_string(),
        "  ".to_string(),
        "Are access logs retained?".to_string(),
        "Who is the CISO?".to_string(),
    ];
    let (run, qs) = engine.create_run(Some("sess-1"), &questions).unwrap();
    assert_eq!(qs.len(), 3);

    let report = engine.run_batch(run.id).unwrap();
    assert_eq!(report.run_id, run.id);
    assert_eq!(report.items.len(), 3);
    assert!(report.items.iter().all(|i| i.error.is_none()));

    let by_id = |id: i64| report.items.iter().find(|i| i.question_id == id).unwrap();
    assert_eq!(by_id(qs[0].id).decision, Some(FinalDecision::Answer));
    assert_eq!(by_id(qs[2].id).decision, Some(FinalDecision::NeedsInfo));
    assert_eq!(by_id(qs[2].id).verify_conf, Some(0));

    let stored = engine.list_questions(run.id).unwrap();
    assert!(stored.iter().all(|q| q.status == QuestionStatus::Final));

    let again = engine.run_batch(run.id).unwrap();
    assert!(again.items.is_empty());

    let err = engine.process_question(run.id, qs[0].id).unwrap_err();
    assert_eq!(err.code, codes::PIPELINE_ALREADY_FINAL);
}

#[test]
fn reviewer_decisions_are_appended() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));
    let (run, qs) = engine
        .create_run(None, &["How long are audit logs kept?".to_string()])
        .unwrap();
    engine.process_question(run.id, qs[0].id).unwrap();

    engine
        .record_review_decision(qs[0].id, ReviewVerdict::NeedsInfo, Some("  cite the SOP  "), "rev@x.io")
        .unwrap();
    engine
        .record_review_decision(qs[0].id, ReviewVerdict::Approve, None, "rev@x.io")
        .unwrap();

    let decisions = engine.list_review_decisions(qs[0].id).unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].reason.as_deref(), Some("cite the SOP"));
    assert_eq!(decisions[1].decision, ReviewVerdict::Approve);
    assert_eq!(engine.list_artifacts(qs[0].id).unwrap().len(), 3);
}

#[test]
fn approvals_flow_through_engine_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));
    engine
        .upsert_suggestions(
            "sess-9",
            &[SuggestionInput {
                id: "q1".into(),
                text: "Audit logs are kept for 90 days.".into(),
            }],
        )
        .unwrap();

    let ana = engine.issue_token("sess-9", "ana@x.io", None).unwrap();
    let claims = engine.verify_token(&ana).unwrap();
    assert_eq!(claims.session_id, "sess-9");

    engine
        .submit_decisions(&ana, &[VoteDecision { suggestion_id: "q1".into(), accept: true }])
        .unwrap();
    engine.record_vote("sess-9", "q1", "bo@x.io", true).unwrap();

    let required = vec!["ana@x.io".to_string(), "bo@x.io".to_string()];
    assert_eq!(engine.suggestion_status("sess-9", &required)[0].status, SuggestionStatus::Accepted);

    let review = engine.review_session(&ana).unwrap();
    assert_eq!(review.approver, "ana@x.io");
    assert_eq!(review.suggestions[0].accepted_by.len(), 2);

    let err = engine.review_session("garbage").unwrap_err();
    assert_eq!(err.code, codes::INVALID_TOKEN);
}

#[test]
fn questionnaire_directory_becomes_one_run() {
    let dir = tempfile::tempdir().unwrap();
    let forms = dir.path().join("forms");
    std::fs::create_dir_all(&forms).unwrap();
    std::fs::write(
        forms.join("b_vendor.json"),
        r#"{"questions": [{"q": "Who is the CISO?"}, {"q": "   "}]}"#,
    )
    .unwrap();
    std::fs::write(
        forms.join("a_security.json"),
        r#"{"questions": [{"q": "How long are audit logs kept?"}, {"q": 7}]}"#,
    )
    .unwrap();
    std::fs::write(forms.join("notes.txt"), "ignored").unwrap();

    let engine = engine(dir.path(), Arc::new(DaysReader::new(false)));
    let (run, qs) = engine.create_run_from_dir(Some("sess-2"), &forms).unwrap();
    assert_eq!(run.session_id.as_deref(), Some("sess-2"));
    let texts: Vec<&str> = qs.iter().map(|q| q.text.as_str()).collect();
    assert_eq!(texts, vec!["How long are audit logs kept?", "Who is the CISO?"]);
}
