use crate::error::EmbedError;
use crate::ollama::OllamaClient;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Marker prepended to inputs when the embedding model distinguishes stored
/// passages from queries.
pub const PASSAGE_PREFIX: &str = "passage: ";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// One vector per input, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embedding provider backed by the model runtime.
///
/// The model is resolved (pulled when absent) exactly once per process; the
/// readiness guard is the only lazily-written state and everything after it
/// is shared read-only.
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimensions: usize,
    asymmetric: bool,
    ready: OnceCell<()>,
}

impl OllamaEmbedder {
    pub fn new(
        client: OllamaClient,
        model: impl Into<String>,
        dimensions: usize,
        asymmetric: bool,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
            asymmetric,
            ready: OnceCell::new(),
        }
    }

    // Queries deliberately get the same marker as passages; the index was
    // built that way and both sides must match. See DESIGN.md.
    fn prefixed(&self, text: &str) -> String {
        if self.asymmetric {
            format!("{PASSAGE_PREFIX}{text}")
        } else {
            text.to_string()
        }
    }

    async fn ensure_ready(&self) -> Result<(), EmbedError> {
        self.ready
            .get_or_try_init(|| async {
                self.client
                    .ensure_model(&self.model)
                    .await
                    .map_err(|error| EmbedError::ModelLoad(error.to_string()))?;
                info!(model = %self.model, "embedding model ready");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
        for vector in vectors {
            if vector.len() != self.dimensions {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimensions,
                    got: vector.len(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors.pop().ok_or_else(|| EmbedError::Backend {
            backend: "ollama".to_string(),
            details: "no embedding returned".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_ready().await?;

        let inputs: Vec<String> = texts.iter().map(|text| self.prefixed(text)).collect();
        let vectors = self.client.embed(&self.model, &inputs).await?;
        self.check_dimensions(&vectors)?;
        Ok(vectors)
    }
}
