use sfq_core::error::AppError;

pub mod http_reader;

pub use http_reader::HttpSpanModel;

/// Raw output of an extractive QA model for one (question, context) pair.
///
/// All three vectors are indexed by token position. Position 0 is the null (no-answer)
/// token. `offsets[i]` is the byte range of token `i` inside the context, or `None` for
/// special and question tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanLogits {
    pub start_logits: Vec<f32>,
    pub end_logits: Vec<f32>,
    pub offsets: Vec<Option<(usize, usize)>>,
}

pub trait SpanModel: Send + Sync {
    fn predict(&self, question: &str, context: &str) -> Result<SpanLogits, AppError>;

    /// Load weights ahead of the first prediction.
    fn warmup(&self) -> Result<(), AppError>;
}
