//! Concrete `IntentBackend` (§4.9): a short YES/NO chat-completion call
//! against an OpenAI-compatible endpoint, the same `async_openai::Client`
//! idiom the teacher's `ChatOpenAI` uses for its own `invoke()`.

use async_trait::async_trait;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{ChatCompletionRequestUserMessage, ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use async_openai::Client;

use super::llm::{ClassifyError, IntentBackend};

/// Calls one designated node's `/v1/chat/completions` with a single short
/// user turn (`build_prompt`'s output) and returns the raw completion text.
pub struct ReqwestIntentBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ReqwestIntentBackend {
    /// `base_url` is the OpenAI-compatible endpoint's root (e.g. a cluster
    /// node's `base_url`, or a separately configured classifier backend).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base = base_url.into();
        let mut config = OpenAIConfig::new();
        let base = base.trim_end_matches('/');
        if !base.is_empty() {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl IntentBackend for ReqwestIntentBackend {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifyError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage::from(prompt),
        )]);
        args.max_tokens(8u32);
        let request = args
            .build()
            .map_err(|e| ClassifyError::Network(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ClassifyError::Network(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::Network("intent backend returned no choices".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}
