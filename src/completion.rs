//! Chat-completion client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
//! Ollama, vLLM...) through `async-openai`, sharing one long-lived
//! reqwest::Client for connection pooling.

use crate::config::EndpointConfig;
use crate::error::AssistantError;
use crate::memory::{ConversationHistory, MessageRole};
use crate::Result;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionStreamResponse,
    },
    Client,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Message as sent to the endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&WireMessage> for ChatCompletionRequestMessage {
    fn from(message: &WireMessage) -> Self {
        let content = message.content.clone();
        match message.role {
            MessageRole::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: content.into(),
                    ..Default::default()
                })
            }
            MessageRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: content.into(),
                    ..Default::default()
                })
            }
            MessageRole::Assistant => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(content.into()),
                    ..Default::default()
                })
            }
        }
    }
}

/// Everything needed for one completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<WireMessage>,
    pub model: String,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Full history, in order, as the request body's message list
    pub fn from_history(history: &ConversationHistory, model: &str, temperature: f32) -> Self {
        Self {
            messages: history
                .messages()
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            model: model.to_string(),
            temperature,
        }
    }

    /// Request body; the streaming flag is set by the call that sends it
    fn to_openai(&self) -> Result<CreateChatCompletionRequest> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(
                self.messages
                    .iter()
                    .map(ChatCompletionRequestMessage::from)
                    .collect::<Vec<_>>(),
            )
            .temperature(self.temperature)
            .build()?;
        Ok(request)
    }
}

/// Seam between the chat turn logic and the remote endpoint
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Single blocking call returning the full reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Incremental reply chunks, in order
    async fn stream(&self, request: &CompletionRequest)
        -> Result<BoxStream<'static, Result<String>>>;
}

/// Reusable OpenAI-compatible client (connection-pooled)
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        let base_url = endpoint.base_url.trim_end_matches('/').to_string();
        let config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key(endpoint.api_key.clone());

        info!(base_url = %base_url, model = %endpoint.model, "Completion client initialized");

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling completion endpoint"
        );

        let response = self
            .client
            .chat()
            .create(request.to_openai()?)
            .await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                AssistantError::from(e)
            })?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AssistantError::Completion("empty response from endpoint".to_string()))?;

        info!(chars = answer.len(), "Completion received");
        Ok(answer)
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<String>>> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let chunks = self
            .client
            .chat()
            .create_stream(request.to_openai()?)
            .await
            .map_err(|e| {
                error!("Completion stream failed to open: {}", e);
                AssistantError::from(e)
            })?;

        Ok(text_deltas(chunks))
    }
}

/// Non-empty `choices[0].delta.content` of each chunk; the first error ends the stream
fn text_deltas<S>(chunks: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<CreateChatCompletionStreamResponse, OpenAIError>>
        + Send
        + 'static,
{
    chunks
        .filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(AssistantError::from(e))),
            }
        })
        .scan(false, |failed, item| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
}
