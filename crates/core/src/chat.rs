use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::models::SearchHit;
use crate::ollama::ResponseStream;
use crate::session::{ConversationTurn, Role, SessionContext};
use crate::traits::{ChatModel, DocumentIndex};
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    /// Retrieve document context before answering.
    pub use_retrieval: bool,
    pub top_k: usize,
    pub temperature: f32,
    pub max_history_turns: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            use_retrieval: true,
            top_k: 5,
            temperature: 0.7,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
        }
    }
}

/// Renders retrieved hits as the context block fed to the prompt.
pub fn format_context(hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for (position, hit) in hits.iter().enumerate() {
        context.push_str(&format!("Document {position}:\n{}\n\n", hit.text));
    }
    context
}

/// Builds the model input from a fixed instruction, the optional context
/// block, the bounded history, and the current query. Deterministic: the
/// same inputs always produce the same prompt.
pub fn build_prompt(query: &str, context: &str, history: &[ConversationTurn]) -> String {
    let mut prompt = String::from("You are a knowledgeable chatbot assistant. ");

    if context.is_empty() {
        prompt.push_str("Answer questions to the best of your knowledge.\n");
    } else {
        prompt.push_str("Use the following context to answer the question.\nContext:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }

    if !history.is_empty() {
        prompt.push_str("Conversation History:\n");
        for turn in history {
            let role = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{role}: {}\n", turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {query}\nAssistant:"));
    prompt
}

/// Drives one chat turn end to end: retrieval, prompt assembly, and the
/// streamed generation call.
pub struct ChatCoordinator<E, S, M>
where
    E: Embedder,
    S: DocumentIndex,
    M: ChatModel,
{
    embedder: E,
    index: S,
    model: M,
    model_ready: OnceCell<()>,
}

impl<E, S, M> ChatCoordinator<E, S, M>
where
    E: Embedder,
    S: DocumentIndex,
    M: ChatModel,
{
    pub fn new(embedder: E, index: S, model: M) -> Self {
        Self {
            embedder,
            index,
            model,
            model_ready: OnceCell::new(),
        }
    }

    /// Generates a streamed answer for `query`.
    ///
    /// The user's turn is recorded on the session before generation is
    /// attempted, so an unavailable runtime still leaves the question in
    /// history. The history window handed to the prompt is snapshotted
    /// beforehand; the current query appears in the prompt exactly once.
    pub async fn respond(
        &self,
        session: &mut SessionContext,
        query: &str,
        options: &ChatOptions,
    ) -> Result<ResponseStream, ChatError> {
        let history: Vec<ConversationTurn> = session.recent(options.max_history_turns).to_vec();
        session.push_user(query);

        let context = if options.use_retrieval {
            self.retrieve_context(query, options.top_k).await?
        } else {
            String::new()
        };

        let prompt = build_prompt(query, &context, &history);

        self.model_ready
            .get_or_try_init(|| self.model.ensure_model())
            .await?;

        self.model.stream_chat(&prompt, options.temperature).await
    }

    /// Retrieval half of a turn. A failing search backend downgrades the
    /// turn to "no context" instead of aborting it; a failing embedding
    /// model is fatal for the turn.
    async fn retrieve_context(&self, query: &str, top_k: usize) -> Result<String, ChatError> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| ChatError::ModelLoad(error.to_string()))?;

        match self.index.hybrid_search(query, &embedding, top_k).await {
            Ok(hits) => {
                info!(hit_count = hits.len(), "hybrid search completed");
                Ok(format_context(&hits))
            }
            Err(error) => {
                warn!(%error, "retrieval failed, answering without document context");
                Ok(String::new())
            }
        }
    }
}
