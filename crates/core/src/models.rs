use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexable slice of a document: the unit of storage and retrieval.
///
/// Chunk ids are `<document_name>_<ordinal>`, unique within the index. Order
/// is only meaningful during ingestion; retrieval ranks by relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_name: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub ingested_at: DateTime<Utc>,
}

/// Read-only projection of a chunk returned by hybrid search. The embedding
/// is never part of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_name: String,
    pub text: String,
    pub score: f64,
}

/// A single record that the bulk call failed to index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub chunk_id: String,
    pub reason: String,
}
