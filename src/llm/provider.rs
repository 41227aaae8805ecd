use async_trait::async_trait;

use crate::core::errors::ModelError;
use super::types::ChatRequest;

/// Provider-agnostic language-model boundary.
///
/// Transport failures surface as `ModelError::Unavailable`, undecodable
/// payloads as `ModelError::ResponseInvalid`; the service layer adds the
/// per-call timeout on top.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai-compat")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, ModelError>;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ModelError>;

    /// generate embeddings, one vector per input
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ModelError>;
}
