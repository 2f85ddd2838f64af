use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::{EmbeddingServiceError, RagError};

/// Turns text into fixed-length vectors via an external embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, reported in log lines.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingServiceError>;
}

/// Generative model: one completion per ordered message sequence.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: ChatRequest) -> Result<String, RagError>;
}
