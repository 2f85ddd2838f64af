//! VectorStore trait: the pluggable persistence boundary of the RAG pipeline.
//!
//! Backends own query embedding so the orchestrator never depends on which embedding model a
//! given store was populated with.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "mongodb")]
use super::mongodb::MongoVectorStore;
#[cfg(feature = "qdrant")]
use super::qdrant::QdrantVectorStore;
use crate::core::config::{Settings, VectorBackend};
use crate::core::errors::RagError;
use crate::llm::Embedder;

/// Caller-supplied key/value metadata attached to every chunk of a document.
pub type Metadata = Map<String, Value>;

/// A contiguous piece of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub metadata: Metadata,
}

impl Chunk {
    /// Caller metadata plus `chunk_index` and `total_chunks`; the added keys win on collision.
    pub fn record_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert("chunk_index".to_string(), Value::from(self.chunk_index));
        metadata.insert("total_chunks".to_string(), Value::from(self.total_chunks));
        metadata
    }

    pub fn with_embedding(self, vector: Vec<f32>) -> EmbeddedChunk {
        let metadata = self.record_metadata();
        EmbeddedChunk {
            text: self.text,
            vector,
            metadata,
        }
    }
}

/// Input to `VectorStore::add_documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// The persisted unit inside a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl StoredRecord {
    pub fn new(id: String, chunk: EmbeddedChunk) -> Self {
        Self {
            id,
            vector: chunk.vector,
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// A record returned by a similarity query. Higher scores are more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> VectorBackend;

    /// Stores the records and returns one unique id per record, in input order.
    ///
    /// Records are searchable once this returns. An empty batch is rejected.
    async fn add_documents(&self, records: Vec<EmbeddedChunk>) -> Result<Vec<String>, RagError>;

    /// Embeds `query` and returns up to `k` records by descending score.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, RagError>;

    /// Removes the given ids. Returns `true` once none of them remain; unknown ids are no-ops.
    async fn delete_documents(&self, ids: &[String]) -> Result<bool, RagError>;
}

pub(crate) fn ensure_not_empty(records: &[EmbeddedChunk]) -> Result<(), RagError> {
    if records.is_empty() {
        return Err(RagError::InvalidInput(
            "add_documents requires at least one record".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_positive_k(k: usize) -> Result<(), RagError> {
    if k == 0 {
        return Err(RagError::InvalidInput("k must be a positive integer".to_string()));
    }
    Ok(())
}

/// Descending score, ties broken by id, so repeated queries order identically. NaN ranks last.
pub(crate) fn rank(results: &mut [SearchResult]) {
    let key = |r: &SearchResult| {
        if r.score.is_nan() {
            f32::NEG_INFINITY
        } else {
            r.score
        }
    };
    results.sort_by(|a, b| key(b).total_cmp(&key(a)).then_with(|| a.id.cmp(&b.id)));
}

/// Builds the backend selected by configuration. The choice is fixed for the process.
///
/// Only backends enabled as cargo features can be selected.
pub async fn build_vector_store(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorStore>, RagError> {
    let store_settings = &settings.vector_store;
    tracing::info!(
        "Using {} vector store at {} (collection '{}')",
        store_settings.backend.as_str(),
        store_settings.url(),
        store_settings.collection()
    );

    match store_settings.backend {
        #[cfg(feature = "mongodb")]
        VectorBackend::Mongodb => {
            let store = MongoVectorStore::connect(store_settings, embedder).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "qdrant")]
        VectorBackend::Qdrant => {
            let store = QdrantVectorStore::new(store_settings, embedder)?;
            if let Some(dimension) = settings.llm.embedding_dimensions {
                store.ensure_collection(dimension).await?;
            }
            Ok(Arc::new(store))
        }
        #[allow(unreachable_patterns)]
        backend => Err(RagError::config(format!(
            "the {} backend is not compiled in; enable the `{}` feature",
            backend.as_str(),
            backend.as_str()
        ))),
    }
}
