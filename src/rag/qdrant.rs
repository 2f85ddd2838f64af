//! Dedicated vector index backend speaking the Qdrant REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::store::{
    ensure_not_empty, ensure_positive_k, rank, EmbeddedChunk, Metadata, SearchResult,
    StoredRecord, VectorStore,
};
use crate::core::config::{VectorBackend, VectorStoreSettings};
use crate::core::errors::RagError;
use crate::llm::Embedder;

pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

impl QdrantVectorStore {
    pub fn new(
        settings: &VectorStoreSettings,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            headers.insert(
                HeaderName::from_static("api-key"),
                HeaderValue::from_str(key.trim())
                    .map_err(|_| RagError::config("invalid vector_store.api_key"))?,
            );
        }
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(RagError::config)?;

        Ok(Self {
            client,
            base_url: settings.url().trim_end_matches('/').to_string(),
            collection: settings.collection().to_string(),
            embedder,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    /// Creates the collection with cosine distance if it does not exist yet.
    /// Returns `true` when a new collection was created.
    pub async fn ensure_collection(&self, dimension: usize) -> Result<bool, RagError> {
        let url = self.collection_url("");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RagError::vector_store)?;
        if response.status().is_success() {
            return Ok(false);
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(failure("collection lookup", response).await);
        }

        let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::vector_store)?;
        if !response.status().is_success() {
            return Err(failure("collection create", response).await);
        }
        tracing::info!(
            "Created Qdrant collection '{}' (dimension {})",
            self.collection,
            dimension
        );
        Ok(true)
    }
}

pub(crate) fn point_body(record: &StoredRecord) -> Value {
    json!({
        "id": record.id,
        "vector": record.vector,
        "payload": {
            "text": record.text,
            "metadata": record.metadata,
        }
    })
}

pub(crate) fn point_to_result(point: ScoredPoint) -> SearchResult {
    let id = match point.id {
        Value::String(id) => id,
        other => other.to_string(),
    };
    let payload = point.payload.unwrap_or(Value::Null);
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let metadata = payload
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    SearchResult {
        id,
        text,
        metadata,
        score: point.score,
    }
}

/// Points written by this store always carry UUID ids; anything else cannot be one of ours.
fn is_point_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

async fn failure(operation: &str, response: Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RagError::VectorStore(format!("qdrant {} failed ({}): {}", operation, status, body))
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Qdrant
    }

    async fn add_documents(&self, records: Vec<EmbeddedChunk>) -> Result<Vec<String>, RagError> {
        ensure_not_empty(&records)?;

        let records: Vec<StoredRecord> = records
            .into_iter()
            .map(|chunk| StoredRecord::new(Uuid::new_v4().to_string(), chunk))
            .collect();
        let points: Vec<Value> = records.iter().map(point_body).collect();

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(RagError::vector_store)?;
        if !response.status().is_success() {
            return Err(failure("upsert", response).await);
        }

        tracing::debug!(
            "Upserted {} points into Qdrant collection '{}'",
            records.len(),
            self.collection
        );
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, RagError> {
        ensure_positive_k(k)?;
        let vector = self.embedder.embed(query).await?;

        let body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });
        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(RagError::vector_store)?;
        if !response.status().is_success() {
            return Err(failure("search", response).await);
        }

        let parsed: SearchResponse = response.json().await.map_err(RagError::vector_store)?;
        let mut results: Vec<SearchResult> =
            parsed.result.into_iter().map(point_to_result).collect();
        rank(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<bool, RagError> {
        let points: Vec<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| is_point_id(id))
            .collect();
        if points.len() < ids.len() {
            tracing::debug!(
                "Skipping {} ids that are not Qdrant point ids",
                ids.len() - points.len()
            );
        }
        if points.is_empty() {
            return Ok(true);
        }

        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(RagError::vector_store)?;
        if !response.status().is_success() {
            return Err(failure("delete", response).await);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::{Path, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};

    use super::*;
    use crate::test_support::{cosine, keyword_vector, spawn_server, KeywordEmbedder};

    #[derive(Default)]
    struct FakeQdrant {
        collections: Mutex<Vec<String>>,
        points: Mutex<HashMap<String, (Vec<f32>, Value)>>,
        delete_requests: Mutex<usize>,
    }

    type Shared = Arc<FakeQdrant>;

    async fn get_collection(
        State(state): State<Shared>,
        Path(name): Path<String>,
    ) -> (HttpStatus, Json<Value>) {
        if state.collections.lock().unwrap().contains(&name) {
            (HttpStatus::OK, Json(json!({ "result": { "status": "green" } })))
        } else {
            (HttpStatus::NOT_FOUND, Json(json!({ "status": { "error": "not found" } })))
        }
    }

    async fn create_collection(
        State(state): State<Shared>,
        Path(name): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        assert_eq!(body["vectors"]["distance"], "Cosine");
        state.collections.lock().unwrap().push(name);
        Json(json!({ "result": true, "status": "ok" }))
    }

    async fn upsert(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let mut points = state.points.lock().unwrap();
        for point in body["points"].as_array().unwrap() {
            let vector: Vec<f32> = serde_json::from_value(point["vector"].clone()).unwrap();
            points.insert(
                point["id"].as_str().unwrap().to_string(),
                (vector, point["payload"].clone()),
            );
        }
        Json(json!({ "result": { "status": "completed" }, "status": "ok" }))
    }

    async fn search(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let query: Vec<f32> = serde_json::from_value(body["vector"].clone()).unwrap();
        let limit = body["limit"].as_u64().unwrap() as usize;
        let points = state.points.lock().unwrap();
        let mut scored: Vec<Value> = points
            .iter()
            .map(|(id, (vector, payload))| {
                json!({ "id": id, "version": 0, "score": cosine(&query, vector), "payload": payload })
            })
            .collect();
        scored.sort_by(|a, b| {
            b["score"]
                .as_f64()
                .partial_cmp(&a["score"].as_f64())
                .unwrap()
        });
        scored.truncate(limit);
        Json(json!({ "result": scored, "status": "ok" }))
    }

    async fn delete(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        *state.delete_requests.lock().unwrap() += 1;
        let mut points = state.points.lock().unwrap();
        for id in body["points"].as_array().unwrap() {
            let id = id.as_str().unwrap();
            assert!(Uuid::parse_str(id).is_ok(), "unexpected point id {}", id);
            points.remove(id);
        }
        Json(json!({ "result": { "status": "completed" }, "status": "ok" }))
    }

    async fn fake_store() -> (QdrantVectorStore, Shared) {
        let state: Shared = Arc::new(FakeQdrant::default());
        let app = Router::new()
            .route("/collections/:name", get(get_collection).put(create_collection))
            .route("/collections/:name/points", put(upsert))
            .route("/collections/:name/points/search", post(search))
            .route("/collections/:name/points/delete", post(delete))
            .with_state(state.clone());
        let url = spawn_server(app).await;

        let settings = VectorStoreSettings {
            backend: VectorBackend::Qdrant,
            url: Some(url),
            ..Default::default()
        };
        let store = QdrantVectorStore::new(&settings, Arc::new(KeywordEmbedder)).unwrap();
        (store, state)
    }

    fn embedded(text: &str, doc_id: u64) -> EmbeddedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".to_string(), json!(doc_id));
        EmbeddedChunk {
            text: text.to_string(),
            vector: keyword_vector(text),
            metadata,
        }
    }

    #[tokio::test]
    async fn add_search_and_delete_round_trip() {
        let (store, state) = fake_store().await;

        let ids = store
            .add_documents(vec![
                embedded("quarterly revenue was five million", 1),
                embedded("the office cafeteria menu", 2),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));

        let results = store.similarity_search("revenue", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ids[0]);
        assert_eq!(results[0].text, "quarterly revenue was five million");
        assert_eq!(results[0].metadata["doc_id"], json!(1));

        assert!(store.delete_documents(&ids[..1]).await.unwrap());
        assert_eq!(state.points.lock().unwrap().len(), 1);
        let results = store.similarity_search("revenue", 5).await.unwrap();
        assert!(results.iter().all(|r| r.id != ids[0]));
    }

    #[tokio::test]
    async fn search_returns_everything_when_k_exceeds_count() {
        let (store, _) = fake_store().await;
        store
            .add_documents(vec![embedded("alpha", 1), embedded("beta", 2)])
            .await
            .unwrap();

        let results = store.similarity_search("alpha", 10).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn rejects_empty_batches_and_zero_k() {
        let (store, _) = fake_store().await;
        assert!(matches!(
            store.add_documents(Vec::new()).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            store.similarity_search("alpha", 0).await,
            Err(RagError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn deleting_twice_or_unknown_ids_succeeds() {
        let (store, _) = fake_store().await;
        let ids = store.add_documents(vec![embedded("alpha", 1)]).await.unwrap();

        assert!(store.delete_documents(&ids).await.unwrap());
        assert!(store.delete_documents(&ids).await.unwrap());
        assert!(store.delete_documents(&[]).await.unwrap());
        assert!(store
            .delete_documents(&["not-a-point-id".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn non_uuid_ids_never_reach_the_server() {
        let (store, state) = fake_store().await;
        let ids = store.add_documents(vec![embedded("alpha", 1)]).await.unwrap();

        let deleted = store
            .delete_documents(&["17".to_string(), "abc".to_string()])
            .await
            .unwrap();

        assert!(deleted);
        assert_eq!(*state.delete_requests.lock().unwrap(), 0);
        assert!(state.points.lock().unwrap().contains_key(&ids[0]));

        let mixed = vec!["17".to_string(), ids[0].clone()];
        assert!(store.delete_documents(&mixed).await.unwrap());
        assert_eq!(*state.delete_requests.lock().unwrap(), 1);
        assert!(state.points.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_collection_creates_only_once() {
        let (store, state) = fake_store().await;

        assert!(store.ensure_collection(32).await.unwrap());
        assert!(!store.ensure_collection(32).await.unwrap());
        assert_eq!(state.collections.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_errors_surface_as_vector_store_errors() {
        let app = Router::new().route(
            "/collections/:name/points/search",
            post(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = spawn_server(app).await;
        let settings = VectorStoreSettings {
            backend: VectorBackend::Qdrant,
            url: Some(url),
            ..Default::default()
        };
        let store = QdrantVectorStore::new(&settings, Arc::new(KeywordEmbedder)).unwrap();

        let err = store.similarity_search("alpha", 3).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStore(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn point_ids_may_be_numeric() {
        let result = point_to_result(ScoredPoint {
            id: json!(17),
            score: 0.5,
            payload: Some(json!({ "text": "t", "metadata": { "a": 1 } })),
        });
        assert_eq!(result.id, "17");
        assert_eq!(result.metadata["a"], json!(1));
    }
}
