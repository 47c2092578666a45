use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sfq_core::domain::FinalDecision;
use sfq_core::error::AppError;

use crate::payload::{AnswerPayload, Citation, ReviewResult, RiskResult};

const RUN_HASH_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proof {
    pub citations: Vec<Citation>,
    pub quotes: Vec<String>,
    pub run_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofBundle {
    pub decision: FinalDecision,
    pub proof: Proof,
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> Result<String, AppError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn encode_scalar(value: &impl Serialize) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| {
        AppError::new("PROOF_ENCODE_FAILED", "Failed to encode proof payload").with_details(e.to_string())
    })
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<(), AppError> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_scalar(k)?);
                out.push(':');
                write_canonical(&map[k.as_str()], out)?;
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&encode_scalar(scalar)?),
    }
    Ok(())
}

fn to_value(v: &impl Serialize) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(v).map_err(|e| {
        AppError::new("PROOF_ENCODE_FAILED", "Failed to encode proof payload").with_details(e.to_string())
    })
}

/// First 16 hex chars of SHA-256 over canonical `[answer, review, risk]`.
pub fn run_hash(answer: &AnswerPayload, review: &ReviewResult, risk: &RiskResult) -> Result<String, AppError> {
    let stages = serde_json::Value::Array(vec![to_value(answer)?, to_value(review)?, to_value(risk)?]);
    let digest = Sha256::digest(canonical_json(&stages)?.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(RUN_HASH_HEX_LEN);
    Ok(hex)
}

pub fn proof_bundle(
    decision: FinalDecision,
    answer: &AnswerPayload,
    review: &ReviewResult,
    risk: &RiskResult,
) -> Result<ProofBundle, AppError> {
    Ok(ProofBundle {
        decision,
        proof: Proof {
            citations: answer.citations.clone(),
            quotes: answer.citations.iter().map(|c| c.quote.clone()).collect(),
            run_hash: run_hash(answer, review, risk)?,
        },
    })
}
