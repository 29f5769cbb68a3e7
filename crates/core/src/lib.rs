pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod session;
pub mod stores;
pub mod traits;

pub use chat::{build_prompt, format_context, ChatCoordinator, ChatOptions, DEFAULT_MAX_HISTORY_TURNS};
pub use chunking::{chunk_text, clean_text, ChunkingConfig};
pub use config::{ChatConfig, SearchConfig};
pub use embeddings::{Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSION, PASSAGE_PREFIX};
pub use error::{ChatError, EmbedError, IngestError, SearchError};
pub use extractor::{extract_document_text, extract_page_texts, PageText, PdfExtractor};
pub use ingest::{
    discover_pdf_files, document_name_for, ingest_file, ingest_folder, ingest_text, FolderReport,
    IngestionReport, SkippedPdf,
};
pub use models::{BulkFailure, DocumentChunk, SearchHit};
pub use ollama::{OllamaChatModel, OllamaClient, ResponseStream};
pub use session::{ConversationTurn, Role, SessionContext};
pub use stores::OpenSearchStore;
pub use traits::{ChatModel, DocumentIndex};
