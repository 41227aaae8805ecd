//! Scripted in-process provider for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::errors::ModelError;
use super::provider::LlmProvider;
use super::types::ChatRequest;

pub enum ScriptedReply {
    Text(String),
    Unavailable(String),
}

/// Replays queued chat replies in order and records every request so tests
/// can assert on the prompts that were actually sent. Embeddings come from
/// an explicit per-text map, with a deterministic hash-derived fallback.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
    dimension: usize,
}

impl ScriptedProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            chat_requests: Mutex::new(Vec::new()),
            embeddings: Mutex::new(HashMap::new()),
            dimension,
        }
    }

    pub fn push_reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Text(text.to_string()));
    }

    pub fn push_unavailable(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Unavailable(message.to_string()));
    }

    pub fn set_embedding(&self, text: &str, vector: Vec<f32>) {
        self.embeddings
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }

    pub fn sent_prompts(&self) -> Vec<String> {
        self.chat_requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.messages
                    .iter()
                    .map(|m| m.content.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }

    fn fallback_embedding(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        (0..self.dimension)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                (hasher.finish() % 1000) as f32 / 1000.0
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ModelError> {
        self.chat_requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Unavailable(msg)) => Err(ModelError::Unavailable(msg)),
            None => Err(ModelError::Unavailable("script exhausted".to_string())),
        }
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ModelError> {
        let map = self.embeddings.lock().unwrap();
        Ok(inputs
            .iter()
            .map(|text| {
                map.get(text)
                    .cloned()
                    .unwrap_or_else(|| self.fallback_embedding(text))
            })
            .collect())
    }
}
