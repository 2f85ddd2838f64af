//! RAG (Retrieval-Augmented Generation) core.
//!
//! - `Chunker`: splits documents into overlapping chunks
//! - `VectorStore`: pluggable vector persistence (MongoDB Atlas or Qdrant, each behind a cargo
//!   feature of the same name)
//! - `RagService`: ingestion, grounded answers, summaries and deletion

pub mod chunker;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod service;
pub mod store;


pub use chunker::{Chunker, TextChunk};
#[cfg(feature = "mongodb")]
pub use self::mongodb::MongoVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use service::{QueryResponse, RagService, Source, DEFAULT_SUMMARY_WORDS, DEFAULT_TOP_K};
pub use store::{
    build_vector_store, Chunk, EmbeddedChunk, Metadata, SearchResult, StoredRecord, VectorStore,
};
