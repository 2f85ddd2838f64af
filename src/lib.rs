//! Retrieval core of the AI knowledge workflow assistant.
//!
//! Documents are chunked, embedded and stored in a vector database (MongoDB Atlas or Qdrant);
//! questions are answered by an OpenAI-compatible chat model grounded in the most similar
//! chunks.

pub mod core;
pub mod llm;
pub mod rag;
pub mod state;

#[cfg(test)]
mod test_support;

pub use crate::core::config::{AppPaths, ConfigService, Settings};
pub use crate::core::errors::{EmbeddingServiceError, RagError};
pub use crate::rag::{QueryResponse, RagService};
pub use crate::state::AppState;
