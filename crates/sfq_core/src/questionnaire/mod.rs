use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
struct QuestionnaireFile {
    #[serde(default)]
    questions: Vec<QuestionnaireEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuestionnaireEntry {
    #[serde(default)]
    q: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionnaireItem {
    pub text: String,
    pub source_file: String,
}

/// Parse `{"questions": [{"q": "..."}]}`. Blank or non-string entries are skipped.
pub fn parse_questionnaire(json: &str) -> Result<Vec<String>, AppError> {
    let file: QuestionnaireFile = serde_json::from_str(json).map_err(|e| {
        AppError::new("QUESTIONNAIRE_INVALID", "Failed to decode questionnaire JSON")
            .with_details(e.to_string())
    })?;
    Ok(file
        .questions
        .into_iter()
        .filter_map(|e| match e.q {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect())
}

/// Load every `*.json` questionnaire in `dir`, ordered by file name.
pub fn load_questionnaire_dir(dir: &Path) -> Result<Vec<QuestionnaireItem>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::new("QUESTIONNAIRE_INVALID", "Failed to read questionnaire directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for ent in entries.flatten() {
        let path = ent.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    let mut out = Vec::new();
    for path in files {
        let raw = fs::read_to_string(&path).map_err(|e| {
            AppError::new("QUESTIONNAIRE_INVALID", "Failed to read questionnaire file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let questions = parse_questionnaire(&raw).map_err(|e| {
            let err = e.details.clone().unwrap_or_default();
            e.with_details(format!("path={}; err={}", path.display(), err))
        })?;
        out.extend(questions.into_iter().map(|text| QuestionnaireItem {
            text,
            source_file: source_file.clone(),
        }));
    }
    Ok(out)
}
