use sfq_core::error::AppError;

/// Dense text embeddings. Queries and chunks must go through the same model.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod ollama_embed;

pub use ollama_embed::OllamaEmbedder;
