//! OpenAI chat completions via `async-openai`.

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client as OpenAIClient;
use async_trait::async_trait;
use tracing::debug;

use super::{CompletionRequest, CompletionService};

/// Completion service backed by the OpenAI chat API
pub struct OpenAiCompletion {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.instructions.as_str())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.input.as_str())
                .build()?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).temperature(0.0_f32).messages(messages);
        if request.json_response {
            args.response_format(ResponseFormat::JsonObject);
        }
        let chat_request = args.build()?;

        debug!(
            model = %self.model,
            input_len = request.input.len(),
            json = request.json_response,
            "Requesting chat completion"
        );

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .context("OpenAI chat completion failed")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("OpenAI returned no completion content")?;

        debug!(output_len = content.len(), "Chat completion received");
        Ok(content)
    }
}
