//! Versioned in-memory vector index.
//!
//! All records in one index share a single embedder version tag and
//! dimensionality; mixing embedding spaces is impossible by construction.
//! Mutation happens on an owned value that is only published through
//! `IndexHandle::install` after it is complete, so concurrent searches
//! always run against a consistent snapshot.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::errors::{IndexError, ModelError};
use crate::llm::Embedder;
use super::chunker::Document;

/// One embedded document. Every record in an index shares the index's
/// version tag and dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document: Document,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Ranked retrieval outcome, highest score first. Empty is a valid state,
/// not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub matches: Vec<ScoredDocument>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    version: String,
    dimension: usize,
    /// Sorted by document id.
    entries: Vec<EmbeddingRecord>,
}

impl EmbeddingIndex {
    /// Embeds every document once and tags the result with the embedder's
    /// version. All-or-nothing: any embedding failure yields no index.
    pub async fn build(
        documents: Vec<Document>,
        embedder: &Embedder,
    ) -> Result<EmbeddingIndex, IndexError> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(IndexError::Model(ModelError::ResponseInvalid(format!(
                "requested {} embeddings, got {}",
                documents.len(),
                vectors.len()
            ))));
        }

        let mut entries = Vec::with_capacity(documents.len());
        for (document, vector) in documents.into_iter().zip(vectors) {
            check_dimension(embedder.dimension(), &vector)?;
            entries.push(EmbeddingRecord { document, vector });
        }
        entries.sort_by_key(|e| e.document.id);

        Ok(EmbeddingIndex {
            version: embedder.version().to_string(),
            dimension: embedder.dimension(),
            entries,
        })
    }

    /// Reconstructs an index from persisted records.
    pub fn restore(
        version: String,
        dimension: usize,
        records: Vec<EmbeddingRecord>,
    ) -> Result<EmbeddingIndex, IndexError> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            check_dimension(dimension, &record.vector)?;
            entries.push(record);
        }
        entries.sort_by_key(|e| e.document.id);
        Ok(EmbeddingIndex {
            version,
            dimension,
            entries,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.entries
    }

    /// True when the embedder or the chunker output no longer matches what
    /// this index was built from. In that case the only safe operation is a
    /// full rebuild; partial re-embedding would mix vector spaces.
    pub fn needs_rebuild(&self, documents: &[Document], embedder: &Embedder) -> bool {
        if self.version != embedder.version() || self.dimension != embedder.dimension() {
            return true;
        }
        if self.entries.len() != documents.len() {
            return true;
        }
        self.entries
            .iter()
            .zip(documents.iter())
            .any(|(entry, doc)| {
                entry.document.id != doc.id
                    || entry.document.fingerprint() != doc.fingerprint()
            })
    }

    /// Adds or replaces a single document. Only valid while the embedder
    /// still matches the index's version tag.
    pub async fn upsert(
        &mut self,
        document: Document,
        embedder: &Embedder,
    ) -> Result<(), IndexError> {
        if embedder.version() != self.version {
            return Err(IndexError::VersionMismatch {
                existing: self.version.clone(),
                requested: embedder.version().to_string(),
            });
        }

        let vector = embedder.embed_one(&document.text).await?;
        check_dimension(self.dimension, &vector)?;

        match self
            .entries
            .binary_search_by_key(&document.id, |e| e.document.id)
        {
            Ok(pos) => self.entries[pos] = EmbeddingRecord { document, vector },
            Err(pos) => self.entries.insert(pos, EmbeddingRecord { document, vector }),
        }
        Ok(())
    }

    /// Cosine-similarity ranking. Equal scores are ordered by ascending
    /// document id so results are reproducible across runs; `top_k` is
    /// clamped to the index size. Read-only.
    pub fn search(&self, vector: &[f32], top_k: usize) -> RetrievalResult {
        let mut matches: Vec<ScoredDocument> = self
            .entries
            .iter()
            .map(|entry| ScoredDocument {
                document: entry.document.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        matches.truncate(top_k);

        RetrievalResult { matches }
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::Dimension {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Swappable snapshot slot for the active index.
///
/// Readers clone the `Arc` and search without holding the lock; a rebuild
/// installs its replacement only after completing, so a cancelled build
/// leaves the previous snapshot in place.
#[derive(Default)]
pub struct IndexHandle {
    inner: RwLock<Option<Arc<EmbeddingIndex>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<EmbeddingIndex>, IndexError> {
        self.inner
            .read()
            .expect("index handle lock poisoned")
            .clone()
            .ok_or(IndexError::NotBuilt)
    }

    pub fn install(&self, index: EmbeddingIndex) {
        let mut guard = self.inner.write().expect("index handle lock poisoned");
        *guard = Some(Arc::new(index));
    }

    pub fn is_built(&self) -> bool {
        self.inner
            .read()
            .expect("index handle lock poisoned")
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::service::LlmConfig;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::LlmService;

    fn doc(id: u64, text: &str) -> Document {
        Document {
            id,
            text: text.to_string(),
        }
    }

    fn embedder_with(provider: Arc<ScriptedProvider>, model: &str) -> Embedder {
        let service = LlmService::new(provider, LlmConfig::default());
        Embedder::new(service, model.to_string(), 3)
    }

    async fn build_index(provider: &Arc<ScriptedProvider>) -> EmbeddingIndex {
        provider.set_embedding("a", vec![1.0, 0.0, 0.0]);
        provider.set_embedding("b", vec![0.0, 1.0, 0.0]);
        provider.set_embedding("c", vec![1.0, 0.0, 0.0]);
        let embedder = embedder_with(provider.clone(), "embed-v1");
        EmbeddingIndex::build(vec![doc(0, "a"), doc(1, "b"), doc(2, "c")], &embedder)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn search_ranks_by_score_then_ascending_id() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let index = build_index(&provider).await;

        let result = index.search(&[1.0, 0.0, 0.0], 3);
        let ids: Vec<u64> = result.matches.iter().map(|m| m.document.id).collect();
        // docs 0 and 2 tie at score 1.0; ascending id breaks the tie
        assert_eq!(ids, vec![0, 2, 1]);
        assert!(result.matches[0].score >= result.matches[1].score);
        assert!(result.matches[1].score >= result.matches[2].score);
    }

    #[tokio::test]
    async fn top_k_is_clamped_to_index_size() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let index = build_index(&provider).await;
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).len(), 3);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 1).len(), 1);
    }

    #[tokio::test]
    async fn upsert_with_new_version_fails() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let mut index = build_index(&provider).await;

        let newer = embedder_with(provider.clone(), "embed-v2");
        let err = index.upsert(doc(3, "d"), &newer).await.unwrap_err();
        match err {
            IndexError::VersionMismatch { existing, requested } => {
                assert_eq!(existing, "embed-v1");
                assert_eq!(requested, "embed-v2");
            }
            other => panic!("expected VersionMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let mut index = build_index(&provider).await;

        provider.set_embedding("b2", vec![0.0, 0.0, 1.0]);
        let embedder = embedder_with(provider.clone(), "embed-v1");
        index.upsert(doc(1, "b2"), &embedder).await.unwrap();

        assert_eq!(index.len(), 3);
        let top = index.search(&[0.0, 0.0, 1.0], 1);
        assert_eq!(top.matches[0].document.text, "b2");
    }

    #[tokio::test]
    async fn new_version_forces_rebuild() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let index = build_index(&provider).await;
        let docs = vec![doc(0, "a"), doc(1, "b"), doc(2, "c")];

        let same = embedder_with(provider.clone(), "embed-v1");
        assert!(!index.needs_rebuild(&docs, &same));

        let newer = embedder_with(provider.clone(), "embed-v2");
        assert!(index.needs_rebuild(&docs, &newer));
    }

    #[tokio::test]
    async fn changed_document_text_forces_rebuild() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let index = build_index(&provider).await;
        let embedder = embedder_with(provider.clone(), "embed-v1");

        let changed = vec![doc(0, "a"), doc(1, "b-edited"), doc(2, "c")];
        assert!(index.needs_rebuild(&changed, &embedder));
    }

    #[tokio::test]
    async fn wrong_dimension_fails_build() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.set_embedding("a", vec![1.0, 0.0]);
        let embedder = embedder_with(provider.clone(), "embed-v1");

        let err = EmbeddingIndex::build(vec![doc(0, "a")], &embedder)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Dimension { expected: 3, got: 2 }));
    }

    #[tokio::test]
    async fn handle_swaps_snapshots_atomically() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let handle = IndexHandle::new();
        assert!(matches!(handle.snapshot(), Err(IndexError::NotBuilt)));

        handle.install(build_index(&provider).await);
        let before = handle.snapshot().unwrap();

        provider.set_embedding("d", vec![0.5, 0.5, 0.0]);
        let embedder = embedder_with(provider.clone(), "embed-v1");
        let rebuilt = EmbeddingIndex::build(vec![doc(0, "d")], &embedder)
            .await
            .unwrap();
        handle.install(rebuilt);

        // the old snapshot keeps serving its consistent view
        assert_eq!(before.len(), 3);
        assert_eq!(handle.snapshot().unwrap().len(), 1);
    }
}
