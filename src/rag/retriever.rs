//! Similarity retrieval over a built index.

use crate::core::errors::IndexError;
use crate::llm::Embedder;
use super::index::{EmbeddingIndex, RetrievalResult};

pub struct Retriever {
    embedder: Embedder,
}

impl Retriever {
    pub fn new(embedder: Embedder) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Embeds the question with the same embedder the index was built with
    /// and drops results below `score_threshold`. Every returned score is
    /// >= the threshold and the result length is <= `top_k`; an empty
    /// result means "no relevant context", which is a legitimate answer
    /// state rather than a fault.
    pub async fn retrieve(
        &self,
        question: &str,
        index: &EmbeddingIndex,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<RetrievalResult, IndexError> {
        if self.embedder.version() != index.version() {
            return Err(IndexError::VersionMismatch {
                existing: index.version().to_string(),
                requested: self.embedder.version().to_string(),
            });
        }

        let vector = self.embedder.embed_one(question).await?;
        let mut result = index.search(&vector, top_k);
        result.matches.retain(|m| m.score >= score_threshold);
        Ok(result)
    }
}
