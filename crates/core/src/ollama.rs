use crate::error::{ChatError, EmbedError};
use crate::traits::ChatModel;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{error, info, warn};

/// Client for the local model runtime's REST API.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunkMessage {
    #[serde(default)]
    content: Option<String>,
}

enum Fragment {
    Text(String),
    Done,
    Malformed,
}

fn parse_fragment(line: &str) -> Fragment {
    let chunk: ChatChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(_) => return Fragment::Malformed,
    };

    if chunk.done {
        return Fragment::Done;
    }

    match chunk.message.and_then(|message| message.content) {
        Some(content) => Fragment::Text(content),
        None => Fragment::Malformed,
    }
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Backend {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: TagsResponse = response.json().await?;
        Ok(payload.models.into_iter().map(|model| model.name).collect())
    }

    pub async fn pull_model(&self, model: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .post(format!("{}/api/pull", self.endpoint))
            .json(&json!({ "model": model, "stream": false }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::ModelLoad(format!(
                "pull of '{model}' returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Pulls `model` if the runtime does not already have it.
    pub async fn ensure_model(&self, model: &str) -> Result<(), ChatError> {
        let available = self
            .list_models()
            .await
            .map_err(|error| ChatError::ModelLoad(error.to_string()))?;

        if !available.iter().any(|name| name == model) {
            info!(model, "model not present locally, pulling");
            self.pull_model(model).await?;
        }

        Ok(())
    }

    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&json!({ "model": model, "input": inputs }))
            .send()
            .await
            .map_err(|error| {
                if error.is_connect() {
                    EmbedError::ModelLoad(format!("embedding runtime unreachable: {error}"))
                } else {
                    EmbedError::Http(error)
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbedError::ModelLoad(format!(
                "embedding model '{model}' is not available"
            )));
        }
        if !response.status().is_success() {
            return Err(EmbedError::Backend {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: EmbedResponse = response.json().await?;
        if payload.embeddings.len() != inputs.len() {
            return Err(EmbedError::Backend {
                backend: "ollama".to_string(),
                details: format!(
                    "{} embeddings returned for {} inputs",
                    payload.embeddings.len(),
                    inputs.len()
                ),
            });
        }

        Ok(payload.embeddings)
    }

    /// Starts a streamed generation. Returns `GenerationUnavailable` when the
    /// runtime cannot be reached or refuses the request, so callers can
    /// render a clear failure instead of hanging on a dead stream.
    pub async fn chat_stream(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<ResponseStream, ChatError> {
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
            "options": { "temperature": temperature },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                ChatError::GenerationUnavailable(format!("model runtime unreachable: {error}"))
            })?;

        if !response.status().is_success() {
            return Err(ChatError::GenerationUnavailable(format!(
                "model runtime returned {}",
                response.status()
            )));
        }

        info!(model, "streaming response from model runtime");
        Ok(ResponseStream::from_response(response))
    }
}

/// A finite, non-restartable stream of generated text fragments.
///
/// Malformed fragments are logged and skipped; a transport error ends the
/// stream after whatever was already received. Once consumed, a new call to
/// [`OllamaClient::chat_stream`] regenerates from scratch.
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl ResponseStream {
    fn from_response(response: reqwest::Response) -> Self {
        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'receive: while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        warn!(%error, "response stream ended early");
                        break;
                    }
                };

                buffer.extend_from_slice(&chunk);
                while let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=position).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match parse_fragment(line) {
                        Fragment::Text(text) => yield text,
                        Fragment::Done => break 'receive,
                        Fragment::Malformed => {
                            error!(fragment = %line, "skipping malformed fragment from model runtime");
                        }
                    }
                }
            }

            let remainder = String::from_utf8_lossy(&buffer);
            let remainder = remainder.trim();
            if !remainder.is_empty() {
                match parse_fragment(remainder) {
                    Fragment::Text(text) => yield text,
                    Fragment::Done => {}
                    Fragment::Malformed => {
                        error!(fragment = %remainder, "skipping malformed fragment from model runtime");
                    }
                }
            }
        };

        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream over fragments that are already in memory. Used by fakes in
    /// tests and anywhere a canned response has to look like a live one.
    pub fn from_fragments(fragments: Vec<String>) -> Self {
        Self {
            inner: Box::pin(futures_util::stream::iter(fragments)),
        }
    }
}

impl Stream for ResponseStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next_unpin(cx)
    }
}

/// A named chat model served by an [`OllamaClient`].
pub struct OllamaChatModel {
    client: OllamaClient,
    model: String,
}

impl OllamaChatModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn ensure_model(&self) -> Result<(), ChatError> {
        self.client.ensure_model(&self.model).await
    }

    async fn stream_chat(&self, prompt: &str, temperature: f32) -> Result<ResponseStream, ChatError> {
        self.client.chat_stream(&self.model, prompt, temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_fragment, Fragment};
    use futures_util::StreamExt;

    #[test]
    fn well_formed_fragment_yields_its_content() {
        let fragment = parse_fragment(r#"{"message":{"content":"Hello"},"done":false}"#);
        assert!(matches!(fragment, Fragment::Text(text) if text == "Hello"));
    }

    #[test]
    fn done_fragment_terminates_the_stream() {
        let fragment = parse_fragment(r#"{"message":{"content":""},"done":true}"#);
        assert!(matches!(fragment, Fragment::Done));
    }

    #[test]
    fn fragment_without_message_content_is_malformed() {
        assert!(matches!(
            parse_fragment(r#"{"done":false}"#),
            Fragment::Malformed
        ));
        assert!(matches!(
            parse_fragment(r#"{"message":{},"done":false}"#),
            Fragment::Malformed
        ));
    }

    #[test]
    fn unparseable_line_is_malformed() {
        assert!(matches!(parse_fragment("not json"), Fragment::Malformed));
    }

    #[tokio::test]
    async fn canned_stream_replays_fragments_in_order() {
        let mut stream = super::ResponseStream::from_fragments(vec![
            "Hel".to_string(),
            "lo".to_string(),
        ]);

        let mut assembled = String::new();
        while let Some(fragment) = stream.next().await {
            assembled.push_str(&fragment);
        }
        assert_eq!(assembled, "Hello");
    }
}
