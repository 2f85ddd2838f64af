//! Typed settings for the retrieval core.
//!
//! Every field has a default so a missing `config.yml` still yields a usable (if
//! unauthenticated) configuration.

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub vector_store: VectorStoreSettings,
    pub rag: ChunkingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Requested output dimensionality; `None` keeps the model's native size.
    pub embedding_dimensions: Option<usize>,
    pub embedding_batch_size: usize,
    pub temperature: f64,
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: None,
            embedding_batch_size: 100,
            temperature: 0.7,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Mongodb,
    Qdrant,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorBackend::Mongodb => "mongodb",
            VectorBackend::Qdrant => "qdrant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mongodb" => Some(VectorBackend::Mongodb),
            "qdrant" => Some(VectorBackend::Qdrant),
            _ => None,
        }
    }

    fn default_url(&self) -> &'static str {
        match self {
            VectorBackend::Mongodb => "mongodb://localhost:27017",
            VectorBackend::Qdrant => "http://localhost:6333",
        }
    }

    fn default_collection(&self) -> &'static str {
        match self {
            VectorBackend::Mongodb => "embeddings",
            VectorBackend::Qdrant => "documents",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: VectorBackend,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub index_name: Option<String>,
    pub num_candidates_factor: Option<usize>,
}

impl VectorStoreSettings {
    pub fn url(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_url())
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or("ai_knowledge_vectors")
    }

    pub fn collection(&self) -> &str {
        self.collection
            .as_deref()
            .unwrap_or_else(|| self.backend.default_collection())
    }

    pub fn index_name(&self) -> &str {
        self.index_name.as_deref().unwrap_or("vector_index")
    }

    pub fn num_candidates_factor(&self) -> usize {
        self.num_candidates_factor.unwrap_or(10).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Settings {
    /// Applies the deployment environment variables on top of file configuration.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure over a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = non_empty("OPENAI_MODEL") {
            self.llm.chat_model = v;
        }
        if let Some(v) = non_empty("EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(backend) = non_empty("VECTOR_DB_TYPE").and_then(|v| VectorBackend::parse(&v)) {
            if backend != self.vector_store.backend {
                // File values describe the other backend; none of them carry over.
                tracing::debug!(
                    "VECTOR_DB_TYPE switches vector store from {} to {}",
                    self.vector_store.backend.as_str(),
                    backend.as_str()
                );
                self.vector_store = VectorStoreSettings {
                    backend,
                    ..Default::default()
                };
            }
        }

        let (url_key, collection_key) = match self.vector_store.backend {
            VectorBackend::Mongodb => ("MONGODB_URL", None),
            VectorBackend::Qdrant => ("QDRANT_URL", Some("QDRANT_COLLECTION_NAME")),
        };
        if let Some(v) = non_empty(url_key) {
            self.vector_store.url = Some(v);
        }
        if let Some(v) = collection_key.and_then(|key| non_empty(key)) {
            self.vector_store.collection = Some(v);
        }
        if self.vector_store.backend == VectorBackend::Mongodb {
            if let Some(v) = non_empty("MONGODB_DB_NAME") {
                self.vector_store.database = Some(v);
            }
        } else if let Some(v) = non_empty("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
    }

    /// Cross-field checks that cannot be expressed per value.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.rag.chunk_size == 0 {
            return Err(RagError::config("rag.chunk_size must be positive"));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(RagError::config(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.llm.chat_model.trim().is_empty() {
            return Err(RagError::config("llm.chat_model must not be empty"));
        }
        if self.llm.embedding_model.trim().is_empty() {
            return Err(RagError::config("llm.embedding_model must not be empty"));
        }
        if self.llm.embedding_batch_size == 0 {
            return Err(RagError::config("llm.embedding_batch_size must be positive"));
        }
        if self.vector_store.url().trim().is_empty() {
            return Err(RagError::config("vector_store.url must not be empty"));
        }
        if self.vector_store.collection().trim().is_empty() {
            return Err(RagError::config("vector_store.collection must not be empty"));
        }
        Ok(())
    }
}
