//! Document-database backend: MongoDB Atlas collections queried through `$vectorSearch`.
//!
//! The search index (`vector_index` by default, on the `embedding` path) must be provisioned
//! on the cluster ahead of time.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::{Client, Collection};
use serde_json::Value;

use super::store::{
    ensure_not_empty, ensure_positive_k, rank, EmbeddedChunk, Metadata, SearchResult,
    StoredRecord, VectorStore,
};
use crate::core::config::{VectorBackend, VectorStoreSettings};
use crate::core::errors::RagError;
use crate::llm::Embedder;

/// Field holding the vector; the search index is defined on it.
const EMBEDDING_PATH: &str = "embedding";

/// Atlas rejects `$vectorSearch` stages whose `numCandidates` exceeds this.
const MAX_NUM_CANDIDATES: usize = 10_000;

pub struct MongoVectorStore {
    collection: Collection<Document>,
    index_name: String,
    num_candidates_factor: usize,
    embedder: Arc<dyn Embedder>,
}

impl MongoVectorStore {
    /// Creates the client. The driver connects lazily on first operation.
    pub async fn connect(
        settings: &VectorStoreSettings,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let client = Client::with_uri_str(settings.url())
            .await
            .map_err(RagError::vector_store)?;
        let collection = client
            .database(settings.database())
            .collection::<Document>(settings.collection());

        Ok(Self {
            collection,
            index_name: settings.index_name().to_string(),
            num_candidates_factor: settings.num_candidates_factor(),
            embedder,
        })
    }
}

fn vector_bson(vector: &[f32]) -> Bson {
    Bson::Array(vector.iter().map(|v| Bson::Double(f64::from(*v))).collect())
}

pub(crate) fn record_document(record: &StoredRecord) -> Result<Document, RagError> {
    let id = ObjectId::parse_str(&record.id).map_err(RagError::vector_store)?;
    let metadata = bson::to_bson(&record.metadata).map_err(RagError::vector_store)?;
    Ok(doc! {
        "_id": id,
        "text": record.text.as_str(),
        "embedding": vector_bson(&record.vector),
        "metadata": metadata,
    })
}

pub(crate) fn search_pipeline(
    index_name: &str,
    query_vector: &[f32],
    k: usize,
    num_candidates_factor: usize,
) -> Vec<Document> {
    let limit = k.min(MAX_NUM_CANDIDATES);
    let num_candidates = k
        .saturating_mul(num_candidates_factor)
        .clamp(limit, MAX_NUM_CANDIDATES);
    let (limit, num_candidates) = (limit as i64, num_candidates as i64);
    vec![
        doc! {
            "$vectorSearch": {
                "index": index_name,
                "path": EMBEDDING_PATH,
                "queryVector": vector_bson(query_vector),
                "numCandidates": num_candidates,
                "limit": limit,
            }
        },
        doc! {
            "$project": {
                "text": 1,
                "metadata": 1,
                "score": { "$meta": "vectorSearchScore" },
            }
        },
    ]
}

/// Maps a `$project`ed search hit back to a result.
pub(crate) fn document_to_result(document: &Document) -> SearchResult {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let metadata = match document.get("metadata") {
        Some(value @ Bson::Document(_)) => match value.clone().into_relaxed_extjson() {
            Value::Object(map) => map,
            _ => Metadata::new(),
        },
        _ => Metadata::new(),
    };
    let score = match document.get("score") {
        Some(Bson::Double(score)) => *score as f32,
        Some(Bson::Int32(score)) => *score as f32,
        Some(Bson::Int64(score)) => *score as f32,
        _ => 0.0,
    };

    SearchResult {
        id,
        text: document.get_str("text").unwrap_or_default().to_string(),
        metadata,
        score,
    }
}

/// Ids that cannot be ObjectIds were never issued by this backend.
pub(crate) fn object_ids(ids: &[String]) -> Vec<ObjectId> {
    ids.iter()
        .filter_map(|id| ObjectId::parse_str(id).ok())
        .collect()
}

#[async_trait]
impl VectorStore for MongoVectorStore {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Mongodb
    }

    async fn add_documents(&self, records: Vec<EmbeddedChunk>) -> Result<Vec<String>, RagError> {
        ensure_not_empty(&records)?;

        let records: Vec<StoredRecord> = records
            .into_iter()
            .map(|chunk| StoredRecord::new(ObjectId::new().to_hex(), chunk))
            .collect();
        let documents = records
            .iter()
            .map(record_document)
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .collection
            .insert_many(documents)
            .await
            .map_err(RagError::vector_store)?;

        tracing::debug!(
            "Inserted {} documents into '{}'",
            result.inserted_ids.len(),
            self.collection.name()
        );
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, RagError> {
        ensure_positive_k(k)?;
        let query_vector = self.embedder.embed(query).await?;

        let pipeline = search_pipeline(
            &self.index_name,
            &query_vector,
            k,
            self.num_candidates_factor,
        );
        let cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(RagError::vector_store)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(RagError::vector_store)?;

        let mut results: Vec<SearchResult> = documents.iter().map(document_to_result).collect();
        rank(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<bool, RagError> {
        let oids = object_ids(ids);
        if oids.len() < ids.len() {
            tracing::debug!("Skipping {} ids that are not ObjectIds", ids.len() - oids.len());
        }
        if oids.is_empty() {
            return Ok(true);
        }

        let result = self
            .collection
            .delete_many(doc! { "_id": { "$in": oids } })
            .await
            .map_err(RagError::vector_store)?;
        tracing::debug!(
            "Deleted {} of {} requested documents",
            result.deleted_count,
            ids.len()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::KeywordEmbedder;

    fn record(id: &str) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            vector: vec![0.5, 0.25],
            text: "quarterly revenue".to_string(),
            metadata: json!({ "doc_id": 42, "tags": ["finance"] })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    async fn local_store() -> MongoVectorStore {
        let settings = VectorStoreSettings::default();
        MongoVectorStore::connect(&settings, Arc::new(KeywordEmbedder))
            .await
            .unwrap()
    }

    #[test]
    fn search_pipeline_targets_the_vector_index() {
        let pipeline = search_pipeline("vector_index", &[0.5, 1.0], 5, 10);

        assert_eq!(pipeline.len(), 2);
        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_str("index").unwrap(), "vector_index");
        assert_eq!(stage.get_str("path").unwrap(), "embedding");
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 50);
        assert_eq!(stage.get_i64("limit").unwrap(), 5);
        assert_eq!(stage.get_array("queryVector").unwrap().len(), 2);

        let project = pipeline[1].get_document("$project").unwrap();
        let score = project.get_document("score").unwrap();
        assert_eq!(score.get_str("$meta").unwrap(), "vectorSearchScore");
    }

    #[test]
    fn candidate_count_stays_within_atlas_limits() {
        let stage = |k: usize| {
            search_pipeline("vector_index", &[0.5], k, 10)[0]
                .get_document("$vectorSearch")
                .unwrap()
                .clone()
        };

        let large = stage(2000);
        assert_eq!(large.get_i64("numCandidates").unwrap(), 10_000);
        assert_eq!(large.get_i64("limit").unwrap(), 2000);

        let huge = stage(usize::MAX / 2);
        assert_eq!(huge.get_i64("numCandidates").unwrap(), 10_000);
        assert_eq!(huge.get_i64("limit").unwrap(), 10_000);

        let no_factor = search_pipeline("vector_index", &[0.5], 7, 0);
        let no_factor = no_factor[0].get_document("$vectorSearch").unwrap();
        assert_eq!(no_factor.get_i64("numCandidates").unwrap(), 7);
    }

    #[test]
    fn record_document_keeps_text_vector_and_metadata() {
        let id = ObjectId::new().to_hex();
        let document = record_document(&record(&id)).unwrap();

        assert_eq!(document.get_object_id("_id").unwrap().to_hex(), id);
        assert_eq!(document.get_str("text").unwrap(), "quarterly revenue");
        assert_eq!(document.get_array("embedding").unwrap().len(), 2);
        let metadata = document.get_document("metadata").unwrap();
        assert_eq!(metadata.get_i64("doc_id").unwrap(), 42);
    }

    #[test]
    fn record_document_rejects_foreign_ids() {
        assert!(matches!(
            record_document(&record("not-an-object-id")),
            Err(RagError::VectorStore(_))
        ));
    }

    #[test]
    fn projected_hits_map_to_results() {
        let oid = ObjectId::new();
        let hit = doc! {
            "_id": oid,
            "text": "quarterly revenue",
            "metadata": { "doc_id": 42_i64, "source": "report.pdf" },
            "score": 0.87,
        };

        let result = document_to_result(&hit);

        assert_eq!(result.id, oid.to_hex());
        assert_eq!(result.text, "quarterly revenue");
        assert_eq!(result.metadata["doc_id"], json!(42));
        assert_eq!(result.metadata["source"], json!("report.pdf"));
        assert!((result.score - 0.87).abs() < 1e-6);
    }

    #[test]
    fn malformed_ids_are_skipped() {
        let oid = ObjectId::new();
        let ids = vec!["nope".to_string(), oid.to_hex()];
        assert_eq!(object_ids(&ids), vec![oid]);
    }

    #[tokio::test]
    async fn validates_before_touching_the_server() {
        let store = local_store().await;

        assert!(matches!(
            store.add_documents(Vec::new()).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            store.similarity_search("revenue", 0).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(store.delete_documents(&[]).await.unwrap());
        assert!(store
            .delete_documents(&["unknown".to_string()])
            .await
            .unwrap());
        assert_eq!(store.backend(), VectorBackend::Mongodb);
    }
}
