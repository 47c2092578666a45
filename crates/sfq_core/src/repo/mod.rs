use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{
    Artifact, ArtifactStage, FinalDecision, Question, QuestionStatus, ReviewDecision,
    ReviewVerdict, Run, Severity,
};
use crate::error::AppError;

pub fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string()))
}

/// Insert a run and one `answering` question per non-blank text, atomically.
pub fn create_run(
    conn: &mut Connection,
    session_id: Option<&str>,
    questions: &[String],
) -> Result<(Run, Vec<Question>), AppError> {
    let texts: Vec<&str> = questions
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if texts.is_empty() {
        return Err(AppError::new("DB_RUN_INVALID", "At least one question is required"));
    }

    let now = now_rfc3339_utc()?;
    let tx = conn.transaction().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to start run transaction").with_details(e.to_string())
    })?;

    tx.execute(
        "INSERT INTO runs(session_id, created_at) VALUES (?1, ?2)",
        params![session_id, now],
    )
    .map_err(|e| AppError::new("DB_INSERT_FAILED", "Failed to insert run").with_details(e.to_string()))?;
    let run_id = tx.last_insert_rowid();

    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
        tx.execute(
            "INSERT INTO questions(run_id, text, status, updated_at) VALUES (?1, ?2, 'answering', ?3)",
            params![run_id, text, now],
        )
        .map_err(|e| {
            AppError::new("DB_INSERT_FAILED", "Failed to insert question").with_details(e.to_string())
        })?;
        out.push(Question {
            id: tx.last_insert_rowid(),
            run_id,
            text: text.to_string(),
            status: QuestionStatus::Answering,
            final_decision: None,
            verify_conf: 0,
            risk_severity: Severity::Low,
            updated_at: now.clone(),
        });
    }

    tx.commit().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to commit run transaction").with_details(e.to_string())
    })?;

    Ok((
        Run {
            id: run_id,
            session_id: session_id.map(|s| s.to_string()),
            created_at: now,
        },
        out,
    ))
}

pub fn get_run(conn: &Connection, id: i64) -> Result<Run, AppError> {
    conn.query_row(
        "SELECT id, session_id, created_at FROM runs WHERE id = ?1",
        [id],
        |row| {
            Ok(Run {
                id: row.get(0)?,
                session_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| AppError::new("DB_QUERY_FAILED", "Failed to query run").with_details(e.to_string()))?
    .ok_or_else(|| AppError::new("DB_NOT_FOUND", "Run not found").with_details(format!("id={id}")))
}

type QuestionRow = (i64, i64, String, String, Option<String>, i64, String, String);

fn question_from_row(row: QuestionRow) -> Result<Question, AppError> {
    let (id, run_id, text, status, final_decision, verify_conf, risk_severity, updated_at) = row;
    let status = QuestionStatus::from_str(&status).ok_or_else(|| {
        AppError::new("DB_ROW_INVALID", "Unknown question status")
            .with_details(format!("id={id}; status={status}"))
    })?;
    let final_decision = match final_decision {
        Some(s) => Some(FinalDecision::from_str(&s).ok_or_else(|| {
            AppError::new("DB_ROW_INVALID", "Unknown final decision")
                .with_details(format!("id={id}; final={s}"))
        })?),
        None => None,
    };
    let risk_severity = Severity::from_str(&risk_severity).ok_or_else(|| {
        AppError::new("DB_ROW_INVALID", "Unknown risk severity")
            .with_details(format!("id={id}; risk_severity={risk_severity}"))
    })?;
    Ok(Question {
        id,
        run_id,
        text,
        status,
        final_decision,
        verify_conf,
        risk_severity,
        updated_at,
    })
}

const QUESTION_COLUMNS: &str =
    "id, run_id, text, status, final, verify_conf, risk_severity, updated_at";

pub fn get_question(conn: &Connection, id: i64) -> Result<Question, AppError> {
    let row: Option<QuestionRow> = conn
        .query_row(
            &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
            [id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query question").with_details(e.to_string())
        })?;
    let row = row.ok_or_else(|| {
        AppError::new("DB_NOT_FOUND", "Question not found").with_details(format!("id={id}"))
    })?;
    question_from_row(row)
}

pub fn list_questions(conn: &Connection, run_id: i64) -> Result<Vec<Question>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE run_id = ?1 ORDER BY id ASC"
        ))
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare questions query")
                .with_details(e.to_string())
        })?;
    let rows = stmt
        .query_map([run_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query questions").with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        let row: QuestionRow = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode question row")
                .with_details(e.to_string())
        })?;
        out.push(question_from_row(row)?);
    }
    Ok(out)
}

pub fn set_question_status(
    conn: &Connection,
    id: i64,
    status: QuestionStatus,
) -> Result<(), AppError> {
    let now = now_rfc3339_utc()?;
    let n = conn
        .execute(
            "UPDATE questions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )
        .map_err(|e| {
            AppError::new("DB_UPDATE_FAILED", "Failed to update question status")
                .with_details(e.to_string())
        })?;
    if n == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Question not found").with_details(format!("id={id}")));
    }
    Ok(())
}

/// Move a question to its terminal state.
pub fn finalize_question(
    conn: &Connection,
    id: i64,
    decision: FinalDecision,
    verify_conf: i64,
    risk_severity: Severity,
) -> Result<(), AppError> {
    let now = now_rfc3339_utc()?;
    let n = conn
        .execute(
            r#"
            UPDATE questions
            SET status = 'final', final = ?1, verify_conf = ?2, risk_severity = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                decision.as_str(),
                verify_conf.clamp(0, 100),
                risk_severity.as_str(),
                now,
                id
            ],
        )
        .map_err(|e| {
            AppError::new("DB_UPDATE_FAILED", "Failed to finalize question").with_details(e.to_string())
        })?;
    if n == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Question not found").with_details(format!("id={id}")));
    }
    Ok(())
}

pub fn append_artifact(
    conn: &Connection,
    question_id: i64,
    stage: ArtifactStage,
    payload: &serde_json::Value,
    latency_ms: i64,
) -> Result<Artifact, AppError> {
    let now = now_rfc3339_utc()?;
    let payload_json = serde_json::to_string(payload).map_err(|e| {
        AppError::new("DB_ARTIFACT_INVALID", "Failed to encode artifact payload")
            .with_details(e.to_string())
    })?;
    conn.execute(
        r#"
        INSERT INTO artifacts(question_id, stage, payload_json, latency_ms, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![question_id, stage.as_str(), payload_json, latency_ms, now],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to insert artifact")
            .with_details(format!("question_id={question_id}; stage={}; err={e}", stage.as_str()))
    })?;

    Ok(Artifact {
        id: conn.last_insert_rowid(),
        question_id,
        stage,
        payload: payload.clone(),
        latency_ms,
        created_at: now,
    })
}

/// Artifacts of a question in append order.
pub fn list_artifacts(conn: &Connection, question_id: i64) -> Result<Vec<Artifact>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, question_id, stage, payload_json, latency_ms, created_at
            FROM artifacts
            WHERE question_id = ?1
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare artifacts query")
                .with_details(e.to_string())
        })?;
    let rows = stmt
        .query_map([question_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query artifacts").with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        let (id, question_id, stage, payload_json, latency_ms, created_at) = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode artifact row")
                .with_details(e.to_string())
        })?;
        let stage = ArtifactStage::from_str(&stage).ok_or_else(|| {
            AppError::new("DB_ROW_INVALID", "Unknown artifact stage")
                .with_details(format!("id={id}; stage={stage}"))
        })?;
        let payload = serde_json::from_str(&payload_json).map_err(|e| {
            AppError::new("DB_ROW_INVALID", "Failed to decode artifact payload")
                .with_details(format!("id={id}; err={e}"))
        })?;
        out.push(Artifact {
            id,
            question_id,
            stage,
            payload,
            latency_ms,
            created_at,
        });
    }
    Ok(out)
}

pub fn record_review_decision(
    conn: &Connection,
    question_id: i64,
    decision: ReviewVerdict,
    reason: Option<&str>,
    actor: &str,
) -> Result<ReviewDecision, AppError> {
    if actor.trim().is_empty() {
        return Err(AppError::new("DB_REVIEW_INVALID", "Reviewer identity is required"));
    }
    // Surface a clean not-found instead of a foreign key failure.
    get_question(conn, question_id)?;

    let now = now_rfc3339_utc()?;
    let reason = reason.map(|r| r.trim()).filter(|r| !r.is_empty());
    conn.execute(
        r#"
        INSERT INTO review_decisions(question_id, decision, reason, actor, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![question_id, decision.as_str(), reason, actor.trim(), now],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to insert review decision").with_details(e.to_string())
    })?;

    Ok(ReviewDecision {
        id: conn.last_insert_rowid(),
        question_id,
        decision,
        reason: reason.map(|r| r.to_string()),
        actor: actor.trim().to_string(),
        created_at: now,
    })
}

pub fn list_review_decisions(
    conn: &Connection,
    question_id: i64,
) -> Result<Vec<ReviewDecision>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, question_id, decision, reason, actor, created_at
            FROM review_decisions
            WHERE question_id = ?1
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare review decisions query")
                .with_details(e.to_string())
        })?;
    let rows = stmt
        .query_map([question_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query review decisions")
                .with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        let (id, question_id, decision, reason, actor, created_at) = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode review decision row")
                .with_details(e.to_string())
        })?;
        let decision = ReviewVerdict::from_str(&decision).ok_or_else(|| {
            AppError::new("DB_ROW_INVALID", "Unknown review decision")
                .with_details(format!("id={id}; decision={decision}"))
        })?;
        out.push(ReviewDecision {
            id,
            question_id,
            decision,
            reason,
            actor,
            created_at,
        });
    }
    Ok(out)
}
