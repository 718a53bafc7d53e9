//! OpenAI-compatible chat provider using the `async-openai` crate.
//!
//! Supports any API following the OpenAI chat completion spec (OpenAI,
//! Azure, local proxies) via the base URL override.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use super::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use super::provider::LlmProvider;
use crate::error::AnswerError;

/// OpenAI-compatible [`LlmProvider`].
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a provider with an optional base URL override.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>, timeout: Duration) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
            timeout,
        }
    }

    /// Converts our message type to the OpenAI SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();
        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_completion_tokens: Some(request.max_tokens),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AnswerError> {
        let openai_request = Self::build_request(request);

        let response = tokio::time::timeout(
            self.timeout,
            self.client.chat().create(openai_request),
        )
        .await
        .map_err(|_| AnswerError::Timeout {
            seconds: self.timeout.as_secs(),
        })?
        .map_err(|e| AnswerError::Llm {
            message: e.to_string(),
        })?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse { content, usage })
    }
}
