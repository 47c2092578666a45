use std::time::Duration;

use serde::{Deserialize, Serialize};
use sfq_core::error::{codes, AppError};

use super::{SpanLogits, SpanModel};
use crate::local::LocalClient;

/// Extractive reader served over HTTP on 127.0.0.1.
///
/// `POST /qa` takes `{model, question, context}` and answers with
/// `{start_logits, end_logits, offsets}`; `POST /warmup` loads the model.
#[derive(Debug, Clone)]
pub struct HttpSpanModel {
    client: LocalClient,
    model: String,
}

impl HttpSpanModel {
    pub fn new(client: LocalClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Serialize)]
struct QaRequest<'a> {
    model: &'a str,
    question: &'a str,
    context: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct WarmupRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct QaResponse {
    start_logits: Vec<f32>,
    end_logits: Vec<f32>,
    offsets: Vec<Option<[usize; 2]>>,
}

fn post_json(url: &str, body: serde_json::Value, timeout: Duration) -> Result<ureq::Response, AppError> {
    match ureq::post(url).timeout(timeout).send_json(body) {
        Ok(r) if r.status() == 200 => Ok(r),
        Ok(r) => Err(AppError::new(codes::EXTRACTION_FAILED, "Reader request failed")
            .with_details(format!("url={url}; status={}", r.status()))),
        Err(e) => Err(AppError::new(codes::EXTRACTION_FAILED, "Failed to call reader endpoint")
            .with_details(format!("url={url}; err={e}"))
            .with_retryable(true)),
    }
}

impl SpanModel for HttpSpanModel {
    fn predict(&self, question: &str, context: &str) -> Result<SpanLogits, AppError> {
        let body = serde_json::to_value(QaRequest {
            model: &self.model,
            question,
            context,
        })
        .map_err(|e| {
            AppError::new(codes::EXTRACTION_FAILED, "Failed to encode reader request")
                .with_details(e.to_string())
        })?;
        let resp = post_json(&self.client.url("/qa"), body, Duration::from_secs(30))?;
        let v: QaResponse = resp.into_json().map_err(|e| {
            AppError::new(codes::EXTRACTION_FAILED, "Failed to decode reader response")
                .with_details(e.to_string())
        })?;
        Ok(SpanLogits {
            start_logits: v.start_logits,
            end_logits: v.end_logits,
            offsets: v.offsets.into_iter().map(|o| o.map(|[s, e]| (s, e))).collect(),
        })
    }

    fn warmup(&self) -> Result<(), AppError> {
        self.client.health_check("/health", Duration::from_millis(800))?;
        let body = serde_json::to_value(WarmupRequest { model: &self.model }).map_err(|e| {
            AppError::new(codes::EXTRACTION_FAILED, "Failed to encode warmup request")
                .with_details(e.to_string())
        })?;
        // First load can take a while.
        post_json(&self.client.url("/warmup"), body, Duration::from_secs(120))?;
        tracing::info!(model = %self.model, "reader model warmed up");
        Ok(())
    }
}
