use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::models::{BulkFailure, DocumentChunk, SearchHit};
use crate::traits::DocumentIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

pub struct OpenSearchStore {
    client: Client,
    endpoint: String,
    index_name: String,
    pipeline_name: String,
    embedding_dimension: usize,
}

impl OpenSearchStore {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            index_name: config.index_name.clone(),
            pipeline_name: config.pipeline_name.clone(),
            embedding_dimension: config.embedding_dimension,
        }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.index_name)
    }

    fn index_body(&self) -> Value {
        json!({
            "settings": {
                "index": { "knn": true },
                "number_of_shards": 1,
                "number_of_replicas": 0
            },
            "mappings": {
                "properties": {
                    "text": { "type": "text" },
                    "embedding": {
                        "type": "knn_vector",
                        "dimension": self.embedding_dimension,
                        "method": {
                            "name": "hnsw",
                            "engine": "lucene",
                            "space_type": "cosinesimil"
                        }
                    },
                    "document_name": { "type": "keyword" },
                    "ingested_at": { "type": "date" }
                }
            }
        })
    }

    fn pipeline_body() -> Value {
        json!({
            "description": "Fuses lexical and vector sub-query scores into one ranking",
            "phase_results_processors": [
                {
                    "normalization-processor": {
                        "normalization": { "technique": "min_max" },
                        "combination": {
                            "technique": "arithmetic_mean",
                            "parameters": { "weights": [0.3, 0.7] }
                        }
                    }
                }
            ]
        })
    }

    fn hybrid_query_body(query_text: &str, query_embedding: &[f32], top_k: usize) -> Value {
        json!({
            "_source": { "exclude": ["embedding"] },
            "query": {
                "hybrid": {
                    "queries": [
                        { "match": { "text": { "query": query_text } } },
                        { "knn": { "embedding": { "vector": query_embedding, "k": top_k } } }
                    ]
                }
            },
            "size": top_k
        })
    }

    /// Installs the hybrid fusion pipeline if it is absent. Idempotent.
    pub async fn ensure_search_pipeline(&self) -> Result<(), SearchError> {
        let url = format!("{}/_search/pipeline/{}", self.endpoint, self.pipeline_name);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::OK {
            return Ok(());
        }
        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(&url)
            .json(&Self::pipeline_body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "search pipeline setup failed with {}",
                response.status()
            )));
        }

        info!(pipeline = %self.pipeline_name, "search pipeline created");
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for OpenSearchStore {
    async fn ensure_index(&self) -> Result<(), SearchError> {
        let response = self.client.head(self.index_url()).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }
        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.index_url())
            .json(&self.index_body())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            // A concurrent creator may have won the race after our HEAD.
            let details: Value = response.json().await.unwrap_or(Value::Null);
            if details.pointer("/error/type").and_then(Value::as_str)
                == Some("resource_already_exists_exception")
            {
                return Ok(());
            }
            return Err(SearchError::Request(format!(
                "index setup failed with {status}"
            )));
        }

        info!(index = %self.index_name, "index created");
        Ok(())
    }

    async fn document_exists(&self, document_name: &str) -> Result<bool, SearchError> {
        let body = json!({ "query": { "term": { "document_name": document_name } } });
        let response = self
            .client
            .post(format!("{}/_count", self.index_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        Ok(payload.pointer("/count").and_then(Value::as_u64).unwrap_or(0) > 0)
    }

    async fn list_document_names(&self) -> Result<Vec<String>, SearchError> {
        let body = json!({
            "size": 0,
            "aggs": {
                "unique_documents": {
                    "terms": { "field": "document_name", "size": 10000 }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        let names = payload
            .pointer("/aggregations/unique_documents/buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|bucket| bucket.pointer("/key").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(names)
    }

    async fn bulk_index(
        &self,
        chunks: &[DocumentChunk],
    ) -> Result<(usize, Vec<BulkFailure>), SearchError> {
        if chunks.is_empty() {
            return Ok((0, Vec::new()));
        }

        let mut operations = Vec::with_capacity(chunks.len() * 2);
        for chunk in chunks {
            operations.push(json!({
                "index": { "_index": self.index_name, "_id": chunk.chunk_id }
            }));
            operations.push(json!({
                "text": chunk.text,
                "embedding": chunk.embedding,
                "document_name": chunk.document_name,
                "ingested_at": chunk.ingested_at,
            }));
        }

        let payload: String = operations
            .into_iter()
            .map(|value| serde_json::to_string(&value))
            .collect::<Result<Vec<_>, serde_json::Error>>()?
            .join("\n")
            + "\n";

        let response = self
            .client
            .post(format!("{}/_bulk", self.endpoint))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        let (indexed, failures) = parse_bulk_response(&body);
        debug!(indexed, failed = failures.len(), "bulk call completed");
        Ok((indexed, failures))
    }

    async fn delete_by_document_name(&self, document_name: &str) -> Result<(), SearchError> {
        let body = json!({ "query": { "term": { "document_name": document_name } } });
        let response = self
            .client
            .post(format!("{}/_delete_by_query", self.index_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        info!(document = document_name, "chunks deleted from index");
        Ok(())
    }

    async fn hybrid_search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let body = Self::hybrid_query_body(query_text, query_embedding, top_k);
        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .query(&[("search_pipeline", self.pipeline_name.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        Ok(parse_search_hits(&payload))
    }
}

fn parse_bulk_response(body: &Value) -> (usize, Vec<BulkFailure>) {
    let items = body
        .pointer("/items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut indexed = 0;
    let mut failures = Vec::new();

    for item in items {
        let action = item.pointer("/index").cloned().unwrap_or(Value::Null);
        let chunk_id = action
            .pointer("/_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(error) = action.pointer("/error") {
            let reason = error
                .pointer("/reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            failures.push(BulkFailure { chunk_id, reason });
        } else {
            indexed += 1;
        }
    }

    (indexed, failures)
}

fn parse_search_hits(body: &Value) -> Vec<SearchHit> {
    body.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| SearchHit {
                    chunk_id: hit
                        .pointer("/_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    document_name: hit
                        .pointer("/_source/document_name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    text: hit
                        .pointer("/_source/text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: hit.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> OpenSearchStore {
        OpenSearchStore::new(&SearchConfig::default())
    }

    #[test]
    fn index_mapping_carries_the_configured_dimension() {
        let store = OpenSearchStore::new(&SearchConfig {
            embedding_dimension: 384,
            ..SearchConfig::default()
        });

        let body = store.index_body();
        assert_eq!(
            body.pointer("/mappings/properties/embedding/dimension"),
            Some(&json!(384))
        );
        assert_eq!(
            body.pointer("/mappings/properties/document_name/type"),
            Some(&json!("keyword"))
        );
    }

    #[test]
    fn hybrid_query_excludes_embeddings_and_bounds_size() {
        let body = OpenSearchStore::hybrid_query_body("refund policy", &[0.1, 0.2], 5);

        assert_eq!(body.pointer("/_source/exclude"), Some(&json!(["embedding"])));
        assert_eq!(body.pointer("/size"), Some(&json!(5)));
        assert_eq!(
            body.pointer("/query/hybrid/queries/0/match/text/query"),
            Some(&json!("refund policy"))
        );
        assert_eq!(
            body.pointer("/query/hybrid/queries/1/knn/embedding/k"),
            Some(&json!(5))
        );
    }

    #[test]
    fn bulk_response_splits_successes_from_failures() {
        let body = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "manual.pdf_0", "status": 201 } },
                {
                    "index": {
                        "_id": "manual.pdf_1",
                        "status": 400,
                        "error": { "type": "mapper_parsing_exception", "reason": "bad vector" }
                    }
                },
                { "index": { "_id": "manual.pdf_2", "status": 200 } }
            ]
        });

        let (indexed, failures) = parse_bulk_response(&body);
        assert_eq!(indexed, 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].chunk_id, "manual.pdf_1");
        assert_eq!(failures[0].reason, "bad vector");
    }

    #[test]
    fn search_hits_are_projected_without_embeddings() {
        let body = json!({
            "hits": {
                "hits": [
                    {
                        "_id": "guide.pdf_3",
                        "_score": 1.25,
                        "_source": { "text": "warranty terms", "document_name": "guide.pdf" }
                    }
                ]
            }
        });

        let hits = parse_search_hits(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "guide.pdf_3");
        assert_eq!(hits[0].document_name, "guide.pdf");
        assert_eq!(hits[0].text, "warranty terms");
        assert!((hits[0].score - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_search_response_yields_no_hits() {
        assert!(parse_search_hits(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected_before_any_request() {
        let result = store().hybrid_search("query", &[0.0; 4], 0).await;
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
    }

    #[test]
    fn bulk_payload_is_newline_delimited_with_trailing_newline() {
        let chunk = DocumentChunk {
            chunk_id: "doc.pdf_0".to_string(),
            document_name: "doc.pdf".to_string(),
            text: "hello".to_string(),
            embedding: vec![0.5, 0.5],
            ingested_at: Utc::now(),
        };

        // Mirror the payload assembly done in bulk_index.
        let operations = vec![
            json!({ "index": { "_index": "documents", "_id": chunk.chunk_id } }),
            json!({
                "text": chunk.text,
                "embedding": chunk.embedding,
                "document_name": chunk.document_name,
                "ingested_at": chunk.ingested_at,
            }),
        ];
        let payload: String = operations
            .into_iter()
            .map(|value| serde_json::to_string(&value).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";

        assert_eq!(payload.lines().count(), 2);
        assert!(payload.ends_with('\n'));
    }
}
