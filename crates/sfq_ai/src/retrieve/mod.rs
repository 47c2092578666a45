use std::sync::Arc;

use sfq_core::error::{codes, AppError};

use crate::embeddings::Embedder;
use crate::index::{Chunk, ChunkIndexer};

pub mod similarity;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    /// Cosine distance to the query; smaller is closer.
    pub distance: f32,
}

pub struct DenseRetriever {
    indexer: Arc<ChunkIndexer>,
    embedder: Arc<dyn Embedder>,
    max_distance: Option<f32>,
}

impl DenseRetriever {
    pub fn new(indexer: Arc<ChunkIndexer>, embedder: Arc<dyn Embedder>, max_distance: Option<f32>) -> Self {
        Self {
            indexer,
            embedder,
            max_distance,
        }
    }

    /// The `top_k` nearest chunks, ascending by distance; ties keep index order.
    ///
    /// Builds the index lazily (never resetting) when none exists. An empty corpus, a zero
    /// query vector, or a cutoff that excludes everything all yield an empty result.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new(codes::RETRIEVAL_FAILED, "Query must not be empty"));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = match self.indexer.load_or_build() {
            Ok(s) => s,
            Err(e) if e.is(codes::INDEX_BUILD_EMPTY_CORPUS) => {
                tracing::debug!("corpus is empty; nothing to retrieve");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AppError::new(
                    codes::RETRIEVAL_UNAVAILABLE,
                    "Index is missing and could not be built",
                )
                .with_details(e.to_string())
                .with_retryable(e.retryable));
            }
        };

        let qv = self.embedder.embed(&snapshot.embedding_model, q).map_err(|e| {
            AppError::new(codes::RETRIEVAL_FAILED, "Failed to embed query")
                .with_details(e.to_string())
                .with_retryable(e.retryable)
        })?;
        if qv.len() != snapshot.dims {
            return Err(AppError::new(
                codes::RETRIEVAL_FAILED,
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", snapshot.dims, qv.len())));
        }

        let qnorm = similarity::l2_norm(&qv);
        if qnorm == 0.0 {
            tracing::debug!("query embedding norm is zero; no passages");
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, f32)> = Vec::new();
        for (pos, chunk) in snapshot.chunks.iter().enumerate() {
            if chunk.embedding.len() != snapshot.dims {
                return Err(AppError::new(codes::RETRIEVAL_FAILED, "Index vector dims mismatch")
                    .with_details(format!(
                        "doc_id={}; chunk_idx={}; expected={}; got={}",
                        chunk.doc_id,
                        chunk.chunk_idx,
                        snapshot.dims,
                        chunk.embedding.len()
                    )));
            }
            let vnorm = similarity::l2_norm(&chunk.embedding);
            if vnorm == 0.0 {
                continue;
            }
            let distance = similarity::cosine_distance(&qv, &chunk.embedding, qnorm, vnorm);
            if let Some(max) = self.max_distance {
                if distance > max {
                    continue;
                }
            }
            hits.push((pos, distance));
        }

        // Stable sort keeps index order among equal distances.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(top_k);

        tracing::debug!(hits = hits.len(), top_k, "retrieved passages");
        Ok(hits
            .into_iter()
            .map(|(pos, distance)| RetrievedPassage {
                chunk: snapshot.chunks[pos].clone(),
                distance,
            })
            .collect())
    }
}
