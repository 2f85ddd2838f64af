use std::fmt;

use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// Nothing is recovered locally: every variant propagates to the caller, which owns
/// translation into user-facing responses.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("chunking failed: {0}")]
    Chunking(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingServiceError),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub fn vector_store<E: fmt::Display>(err: E) -> Self {
        RagError::VectorStore(err.to_string())
    }

    pub fn generation<E: fmt::Display>(err: E) -> Self {
        RagError::Generation(err.to_string())
    }

    pub fn config<E: fmt::Display>(err: E) -> Self {
        RagError::Config(err.to_string())
    }
}

/// Category of an embedding-service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingFailure {
    Auth,
    RateLimit,
    Network,
    Timeout,
    MalformedResponse,
    InvalidInput,
    /// Any other non-success HTTP status.
    Service(u16),
}

impl fmt::Display for EmbeddingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingFailure::Auth => write!(f, "authentication"),
            EmbeddingFailure::RateLimit => write!(f, "rate limit"),
            EmbeddingFailure::Network => write!(f, "network"),
            EmbeddingFailure::Timeout => write!(f, "timeout"),
            EmbeddingFailure::MalformedResponse => write!(f, "malformed response"),
            EmbeddingFailure::InvalidInput => write!(f, "invalid input"),
            EmbeddingFailure::Service(status) => write!(f, "status {}", status),
        }
    }
}

/// Failure of an embedding call.
///
/// `index` points at the offending input: the input itself when it was rejected locally, the
/// first input of the failing request for batch calls, or the chunk index during ingestion.
#[derive(Debug, Clone, Error)]
#[error("embedding service {kind} error{}: {message}", describe_index(.index))]
pub struct EmbeddingServiceError {
    pub index: Option<usize>,
    pub kind: EmbeddingFailure,
    pub message: String,
}

fn describe_index(index: &Option<usize>) -> String {
    match index {
        Some(idx) => format!(" at input {}", idx),
        None => String::new(),
    }
}

impl EmbeddingServiceError {
    pub fn new(kind: EmbeddingFailure, message: impl Into<String>) -> Self {
        Self {
            index: None,
            kind,
            message: message.into(),
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => EmbeddingFailure::Auth,
            429 => EmbeddingFailure::RateLimit,
            other => EmbeddingFailure::Service(other),
        };
        Self::new(kind, body.to_string())
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            EmbeddingFailure::Timeout
        } else if err.is_decode() {
            EmbeddingFailure::MalformedResponse
        } else {
            EmbeddingFailure::Network
        };
        Self::new(kind, err.to_string())
    }

    /// Whether a retry might succeed. The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            EmbeddingFailure::RateLimit | EmbeddingFailure::Network | EmbeddingFailure::Timeout
        ) || matches!(self.kind, EmbeddingFailure::Service(status) if status >= 500)
    }
}
