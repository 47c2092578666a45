use serde::{Deserialize, Serialize};
use sfq_core::error::{codes, AppError};

use super::Embedder;
use crate::local::LocalClient;

const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: LocalClient,
}

impl OllamaEmbedder {
    pub fn new(client: LocalClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

fn bounded_prompt(input: &str) -> &str {
    match input.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((byte_idx, _)) => &input[..byte_idx],
        None => input,
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let url = self.client.url("/api/embeddings");
        let req = EmbeddingsRequest {
            model,
            prompt: bounded_prompt(input),
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::EMBEDDINGS_FAILED, "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        match ureq::post(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send_json(body)
        {
            Ok(r) if r.status() == 200 => {
                let v: EmbeddingsResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::EMBEDDINGS_FAILED, "Failed to decode embeddings response")
                        .with_details(e.to_string())
                })?;
                if v.embedding.is_empty() {
                    return Err(AppError::new(
                        codes::EMBEDDINGS_FAILED,
                        "Embeddings response was empty",
                    ));
                }
                Ok(v.embedding)
            }
            Ok(r) => Err(AppError::new(codes::EMBEDDINGS_FAILED, "Embeddings request failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Failed to call embeddings endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_cut_on_a_char_boundary() {
        let s = "é".repeat(MAX_PROMPT_CHARS + 5);
        let p = bounded_prompt(&s);
        assert_eq!(p.chars().count(), MAX_PROMPT_CHARS);
        assert_eq!(bounded_prompt("short"), "short");
    }
}
