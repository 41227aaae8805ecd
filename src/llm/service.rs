use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::config::service::LlmConfig;
use crate::core::errors::ModelError;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};

/// Wraps a provider with the config-resolved model id and the per-call
/// timeout. Every outbound model call in the system goes through here, so
/// nothing upstream can hang past the budget.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    pub async fn health_check(&self) -> Result<bool, ModelError> {
        self.provider.health_check().await
    }

    /// Single-shot generation against the configured chat model.
    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let mut request = ChatRequest::new(messages);
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;

        let budget = self.request_timeout();
        timeout(budget, self.provider.chat(request, &self.config.chat_model))
            .await
            .map_err(|_| ModelError::Timeout(budget))?
    }

    pub async fn embed(
        &self,
        inputs: &[String],
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ModelError> {
        let budget = self.request_timeout();
        timeout(budget, self.provider.embed(inputs, model_id))
            .await
            .map_err(|_| ModelError::Timeout(budget))?
    }
}
