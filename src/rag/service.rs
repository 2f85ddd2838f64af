//! RAG orchestrator: ingestion, grounded question answering and summarization.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::chunker::Chunker;
use super::store::{Chunk, EmbeddedChunk, Metadata, VectorStore};
use crate::core::config::VectorBackend;
use crate::core::errors::RagError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ChatRole, Embedder};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SUMMARY_WORDS: usize = 500;

/// Characters of chunk text echoed back in each source citation.
const SOURCE_PREVIEW_CHARS: usize = 200;

const ANSWER_PROMPT: &str = "You are an AI assistant helping employees find information from company documents.
Use the following context to answer the question. If you cannot find the answer in the context, say so.
Be concise and accurate.

Context:
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

pub struct RagService {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
}

impl RagService {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            llm,
        }
    }

    pub fn backend(&self) -> VectorBackend {
        self.store.backend()
    }

    /// Chunks, embeds and stores a document, returning one record id per chunk in order.
    ///
    /// Embedding runs before anything is written, so a failure leaves the store untouched.
    pub async fn process_document(
        &self,
        text: &str,
        metadata: Metadata,
    ) -> Result<Vec<String>, RagError> {
        let pieces = self.chunker.split_text(text);
        if pieces.is_empty() {
            tracing::warn!("Document produced no chunks; nothing stored");
            return Ok(Vec::new());
        }

        let total_chunks = pieces.len();
        let mut records: Vec<EmbeddedChunk> = Vec::with_capacity(total_chunks);
        for (chunk_index, text) in pieces.into_iter().enumerate() {
            let vector = self
                .embedder
                .embed(&text)
                .await
                .map_err(|err| err.at(chunk_index))?;
            let chunk = Chunk {
                text,
                chunk_index,
                total_chunks,
                metadata: metadata.clone(),
            };
            records.push(chunk.with_embedding(vector));
        }

        let ids = self.store.add_documents(records).await?;
        tracing::info!(
            "Stored {} chunks in {} vector store (embeddings {})",
            ids.len(),
            self.store.backend().as_str(),
            self.embedder.model()
        );
        Ok(ids)
    }

    /// Same as `process_document` for raw uploads, which must be UTF-8.
    pub async fn process_document_bytes(
        &self,
        bytes: &[u8],
        metadata: Metadata,
    ) -> Result<Vec<String>, RagError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| RagError::Chunking(format!("document is not valid UTF-8: {}", err)))?;
        self.process_document(text, metadata).await
    }

    /// Answers `question` from the `k` most relevant chunks.
    ///
    /// `history` turns are placed between the instructions and the question; system turns in it
    /// are ignored.
    pub async fn query(
        &self,
        question: &str,
        k: usize,
        history: &[ChatMessage],
    ) -> Result<QueryResponse, RagError> {
        let results = self.store.similarity_search(question, k).await?;
        tracing::debug!(
            "Retrieved {} chunks for query, answering with {}",
            results.len(),
            self.llm.model()
        );

        let context = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(format!("{}{}", ANSWER_PROMPT, context)));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .cloned(),
        );
        messages.push(ChatMessage::user(question));

        let answer = self.llm.generate(ChatRequest::new(messages)).await?;

        let sources = results
            .into_iter()
            .map(|r| Source {
                text: preview(&r.text),
                metadata: r.metadata,
                score: r.score,
            })
            .collect();

        Ok(QueryResponse { answer, sources })
    }

    /// Summarizes `text` in roughly `max_length` words. Nothing is retrieved or stored.
    pub async fn summarize_document(
        &self,
        text: &str,
        max_length: usize,
    ) -> Result<String, RagError> {
        let instructions = format!(
            "Summarize the following document in approximately {} words. Be concise and capture the key points.",
            max_length
        );
        let request = ChatRequest::new(vec![
            ChatMessage::system(instructions),
            ChatMessage::user(text),
        ]);
        tracing::debug!("Summarizing {} chars with {}", text.chars().count(), self.llm.model());
        self.llm.generate(request).await
    }

    /// Removes the records with the given ids from the store.
    pub async fn delete_document_embeddings(&self, ids: &[String]) -> Result<bool, RagError> {
        let deleted = self.store.delete_documents(ids).await?;
        tracing::info!("Deleted {} embeddings", ids.len());
        Ok(deleted)
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}
