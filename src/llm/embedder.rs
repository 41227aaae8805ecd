use crate::core::errors::ModelError;
use super::service::LlmService;

/// Embedding boundary: one declared model version and dimensionality.
/// Vectors are comparable only within a single version; the index and
/// retriever enforce that with `IndexError::VersionMismatch`.
#[derive(Clone)]
pub struct Embedder {
    service: LlmService,
    model_id: String,
    dimension: usize,
}

impl Embedder {
    pub fn new(service: LlmService, model_id: String, dimension: usize) -> Self {
        Self {
            service,
            model_id,
            dimension,
        }
    }

    /// The version tag stamped onto every index built with this embedder.
    pub fn version(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.service.embed(texts, &self.model_id).await
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let inputs = [text.to_string()];
        let mut vectors = self.embed(&inputs).await?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::ResponseInvalid("empty embedding response".to_string()))
    }
}
