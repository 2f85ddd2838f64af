use std::env;
use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::logging;
use crate::llm::{ChatModel, Embedder, OpenAiProvider};
use crate::rag::{build_vector_store, Chunker, RagService};

pub mod error;

use error::InitializationError;

/// Process-wide state for hosts embedding the knowledge assistant.
///
/// The vector store backend is chosen once here and never changes for the lifetime of the
/// process.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub rag: Arc<RagService>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Loads `.env`, resolves paths and installs logging
    /// 2. Loads configuration (files, then environment overrides)
    /// 3. Builds the OpenAI-compatible provider and the configured vector store
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let dotenv = dotenvy::dotenv();
        let paths = Arc::new(AppPaths::new());
        logging::init(&paths);
        if let Err(e) = dotenv {
            if !e.not_found() {
                tracing::warn!("Failed to read .env: {}", e);
            }
        }
        Self::initialize_with(paths, |key| env::var(key).ok()).await
    }

    /// Same as `initialize` with explicit paths and environment lookup; logging is left alone.
    pub async fn initialize_with<F>(
        paths: Arc<AppPaths>,
        lookup: F,
    ) -> Result<Arc<Self>, InitializationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings_with(lookup)
            .map_err(|e| InitializationError::Config(e.into()))?;

        let provider = Arc::new(
            OpenAiProvider::new(&settings.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let store = build_vector_store(&settings, provider.clone())
            .await
            .map_err(|e| InitializationError::VectorStore(e.into()))?;
        let chunker = Chunker::from_settings(&settings.rag)
            .map_err(|e| InitializationError::Chunker(e.into()))?;

        tracing::info!(
            "Knowledge assistant ready (chat model {}, embeddings {}, {} store)",
            ChatModel::model(provider.as_ref()),
            Embedder::model(provider.as_ref()),
            store.backend().as_str()
        );

        let rag = Arc::new(RagService::new(chunker, provider.clone(), store, provider));

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            rag,
        }))
    }
}
