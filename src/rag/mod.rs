//! The retrieval path: deterministic chunking, versioned embedding index,
//! similarity retrieval, bounded context assembly, and index persistence.

pub mod chunker;
pub mod context_builder;
pub mod index;
pub mod retriever;
pub mod store;

pub use chunker::{chunk, Document};
pub use index::{EmbeddingIndex, EmbeddingRecord, IndexHandle, RetrievalResult, ScoredDocument};
pub use retriever::Retriever;
pub use store::SqliteIndexStore;
