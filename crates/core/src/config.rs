use crate::chat::DEFAULT_MAX_HISTORY_TURNS;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSION;

/// Connection settings for the search backend.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index_name: String,
    /// Name of the server-side pipeline that fuses lexical and vector scores.
    pub pipeline_name: String,
    pub embedding_dimension: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index_name: "documents".to_string(),
            pipeline_name: "nlp-search-pipeline".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Settings for the model runtime that serves chat and embedding models.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub endpoint: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Prefix passages and queries with a role marker before encoding.
    pub asymmetric_embedding: bool,
    pub max_history_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            chat_model: "llama3.2:1b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            asymmetric_embedding: false,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
        }
    }
}
