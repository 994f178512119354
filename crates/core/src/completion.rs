use crate::error::ProviderError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;

/// Default instructions used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly voice assistant. \
Your replies are read aloud, so keep them short, conversational and free of markdown.";

/// Turns the user's finished utterance into the assistant's reply.
///
/// Implementations are stateless request/response wrappers and never retry;
/// a failed call surfaces as a [`ProviderError`] and the caller decides what to do.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generates reply text for the given user text.
    async fn complete(&self, text: &str) -> Result<String, ProviderError>;
}

/// A `CompletionClient` for any OpenAI-compatible chat completion API.
pub struct OpenAICompletionClient {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAICompletionClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the provider.
    /// * `model` - Chat model identifier (e.g., "gpt-4o").
    /// * `system_prompt` - Instructions sent ahead of every user utterance.
    pub fn new(config: OpenAIConfig, model: String, system_prompt: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            system_prompt,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAICompletionClient {
    async fn complete(&self, text: &str) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_prompt.clone())
                    .build()
                    .map_err(map_openai_error)?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text.to_string())
                    .build()
                    .map_err(map_openai_error)?
                    .into(),
            ])
            .build()
            .map_err(map_openai_error)?;

        let response: CreateChatCompletionResponse = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        reply_text(response)
    }
}

/// Pulls the assistant's text out of a chat completion response.
fn reply_text(response: CreateChatCompletionResponse) -> Result<String, ProviderError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedPayload("response had no choices".into()))?
        .message
        .content
        .ok_or_else(|| ProviderError::MalformedPayload("response had no content".into()))?;

    if content.trim().is_empty() {
        return Err(ProviderError::MalformedPayload(
            "response content was empty".into(),
        ));
    }
    Ok(content)
}

fn map_openai_error(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::ApiError(api) => ProviderError::Rejected(api.message),
        OpenAIError::JSONDeserialize(e) => ProviderError::MalformedPayload(e.to_string()),
        OpenAIError::InvalidArgument(msg) => ProviderError::Rejected(msg),
        other => ProviderError::Transport(other.to_string()),
    }
}
