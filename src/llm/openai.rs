//! OpenAI-compatible HTTP provider for embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::provider::{ChatModel, Embedder};
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::{EmbeddingFailure, EmbeddingServiceError, RagError};

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    client: Client,
    chat_model: String,
    embedding_model: String,
    dimensions: Option<usize>,
    batch_size: usize,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, RagError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).map_err(|_| RagError::config("invalid llm.api_key"))?,
            );
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(RagError::config)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client,
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            dimensions: settings.embedding_dimensions,
            batch_size: settings.embedding_batch_size.max(1),
            temperature: settings.temperature,
        })
    }

    async fn request_embeddings(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingServiceError::from_transport(&e))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(EmbeddingServiceError::from_status(status.as_u16(), &text));
        }

        let mut parsed: EmbeddingResponse = res.json().await.map_err(|e| {
            EmbeddingServiceError::new(EmbeddingFailure::MalformedResponse, e.to_string())
        })?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingServiceError::new(
                EmbeddingFailure::MalformedResponse,
                format!(
                    "service returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                ),
            ));
        }
        parsed.data.sort_by_key(|entry| entry.index);

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiProvider {
    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        let inputs = [text.to_string()];
        let mut vectors = self.embed_batch(&inputs).await?;
        vectors.pop().ok_or_else(|| {
            EmbeddingServiceError::new(EmbeddingFailure::MalformedResponse, "empty embedding response")
                .at(0)
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        if let Some(idx) = texts.iter().position(|t| t.is_empty()) {
            return Err(
                EmbeddingServiceError::new(EmbeddingFailure::InvalidInput, "input text is empty")
                    .at(idx),
            );
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            let offset = batch_idx * self.batch_size;
            let vectors = self
                .request_embeddings(batch)
                .await
                .map_err(|e| e.at(offset))?;
            embeddings.extend(vectors);
        }

        tracing::debug!(
            "Embedded {} inputs with {}",
            embeddings.len(),
            self.embedding_model
        );
        Ok(embeddings)
    }
}

#[async_trait]
impl ChatModel for OpenAiProvider {
    fn model(&self) -> &str {
        &self.chat_model
    }

    async fn generate(&self, request: ChatRequest) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "temperature": self.temperature,
            "stream": false,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::generation)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RagError::Generation("chat completion returned no content".to_string()))
    }
}
