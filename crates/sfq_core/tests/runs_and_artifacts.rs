use pretty_assertions::assert_eq;
use sfq_core::db;
use sfq_core::domain::{ArtifactStage, FinalDecision, QuestionStatus, ReviewVerdict, Severity};
use sfq_core::repo;

#[test]
fn create_run_inserts_answering_questions() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let (run, questions) = repo::create_run(
        &mut conn,
        Some("sess-1"),
        &[
            "Do you encrypt data at rest?".to_string(),
            "   ".to_string(),
            "Is MFA enforced?".to_string(),
        ],
    )
    .expect("create_run");

    assert_eq!(questions.len(), 2);
    assert_eq!(repo::get_run(&conn, run.id).unwrap().session_id.as_deref(), Some("sess-1"));

    let listed = repo::list_questions(&conn, run.id).unwrap();
    assert_eq!(listed, questions);
    assert!(listed.iter().all(|q| q.status == QuestionStatus::Answering));
    assert!(listed.iter().all(|q| q.final_decision.is_none()));
}

#[test]
fn create_run_requires_questions() {
    let mut conn = db::open_in_memory().unwrap();
    db::migrate(&mut conn).unwrap();
    let err = repo::create_run(&mut conn, None, &[" ".to_string()]).unwrap_err();
    assert_eq!(err.code, "DB_RUN_INVALID");
}

#[test]
fn artifacts_append_in_order_and_question_finalizes() {
    let mut conn = db::open_in_memory().unwrap();
    db::migrate(&mut conn).unwrap();
    let (_, qs) = repo::create_run(&mut conn, None, &["q".to_string()]).unwrap();
    let qid = qs[0].id;

    repo::append_artifact(&conn, qid, ArtifactStage::Answering, &serde_json::json!({"answer": "AES-256"}), 12)
        .unwrap();
    repo::append_artifact(&conn, qid, ArtifactStage::Review, &serde_json::json!({"verification_conf": 0.9}), 0)
        .unwrap();
    repo::append_artifact(&conn, qid, ArtifactStage::Risk, &serde_json::json!({"severity": "low"}), 1)
        .unwrap();

    let arts = repo::list_artifacts(&conn, qid).unwrap();
    let stages: Vec<ArtifactStage> = arts.iter().map(|a| a.stage).collect();
    assert_eq!(
        stages,
        vec![ArtifactStage::Answering, ArtifactStage::Review, ArtifactStage::Risk]
    );
    assert_eq!(arts[0].payload["answer"], "AES-256");
    assert_eq!(arts[0].latency_ms, 12);

    repo::set_question_status(&conn, qid, QuestionStatus::Risk).unwrap();
    repo::finalize_question(&conn, qid, FinalDecision::Answer, 95, Severity::Low).unwrap();
    let q = repo::get_question(&conn, qid).unwrap();
    assert_eq!(q.status, QuestionStatus::Final);
    assert_eq!(q.final_decision, Some(FinalDecision::Answer));
    assert_eq!(q.verify_conf, 95);
    assert_eq!(q.risk_severity, Severity::Low);
}

#[test]
fn review_decisions_are_recorded_per_question() {
    let mut conn = db::open_in_memory().unwrap();
    db::migrate(&mut conn).unwrap();
    let (_, qs) = repo::create_run(&mut conn, None, &["q".to_string()]).unwrap();

    repo::record_review_decision(&conn, qs[0].id, ReviewVerdict::NeedsInfo, Some(" cite SOC2 "), "rev@x.io")
        .unwrap();
    let got = repo::list_review_decisions(&conn, qs[0].id).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].decision, ReviewVerdict::NeedsInfo);
    assert_eq!(got[0].reason.as_deref(), Some("cite SOC2"));

    let err = repo::record_review_decision(&conn, 9_999, ReviewVerdict::Approve, None, "rev@x.io")
        .unwrap_err();
    assert_eq!(err.code, "DB_NOT_FOUND");
}

#[test]
fn unknown_question_is_not_found() {
    let mut conn = db::open_in_memory().unwrap();
    db::migrate(&mut conn).unwrap();
    assert_eq!(repo::get_question(&conn, 1).unwrap_err().code, "DB_NOT_FOUND");
    assert_eq!(
        repo::set_question_status(&conn, 1, QuestionStatus::Review).unwrap_err().code,
        "DB_NOT_FOUND"
    );
}
