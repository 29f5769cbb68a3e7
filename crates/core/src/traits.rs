use crate::error::{ChatError, SearchError};
use crate::models::{BulkFailure, DocumentChunk, SearchHit};
use crate::ollama::ResponseStream;
use async_trait::async_trait;

/// The index that stores document chunks and serves hybrid retrieval.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Creates the index if it is absent. Safe to call on every request.
    async fn ensure_index(&self) -> Result<(), SearchError>;

    async fn document_exists(&self, document_name: &str) -> Result<bool, SearchError>;

    async fn list_document_names(&self) -> Result<Vec<String>, SearchError>;

    /// Upserts the records in one batch. Returns how many were indexed and
    /// which ones failed; callers must not assume all-or-nothing semantics.
    async fn bulk_index(
        &self,
        chunks: &[DocumentChunk],
    ) -> Result<(usize, Vec<BulkFailure>), SearchError>;

    /// Removes every chunk owned by `document_name`. Deleting a name that is
    /// not indexed is a no-op.
    async fn delete_by_document_name(&self, document_name: &str) -> Result<(), SearchError>;

    /// Fused lexical + vector retrieval, most relevant first, at most
    /// `top_k` hits.
    async fn hybrid_search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// A generation model that can stream a completion for a prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn ensure_model(&self) -> Result<(), ChatError>;

    async fn stream_chat(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<ResponseStream, ChatError>;
}
