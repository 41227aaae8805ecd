//! SQLite persistence for the embedding index.
//!
//! Records are {document id, text, vector, version tag}; vectors are stored
//! as little-endian f32 BLOBs. On load the stored version tag is compared
//! against the active embedder; a mismatch means the caller rebuilds
//! instead of reusing stale vectors.

use std::path::PathBuf;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::AppPaths;
use crate::core::errors::IndexError;
use super::chunker::Document;
use super::index::{EmbeddingIndex, EmbeddingRecord};

pub struct SqliteIndexStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteIndexStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, IndexError> {
        Self::with_path(paths.index_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_records (
                doc_id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                version TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Replaces all persisted records with the given index's contents.
    pub async fn save(&self, index: &EmbeddingIndex) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM embedding_records")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for record in index.records() {
            sqlx::query(
                "INSERT INTO embedding_records (doc_id, text, embedding, version)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(record.document.id as i64)
            .bind(&record.document.text)
            .bind(serialize_embedding(&record.vector))
            .bind(index.version())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('embedder_version', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(index.version())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('dimension', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(index.dimension() as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Loads the persisted index, if any. The caller compares the returned
    /// version tag against the active embedder and rebuilds on mismatch.
    pub async fn load(&self) -> Result<Option<EmbeddingIndex>, IndexError> {
        let version: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedder_version'")
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        let Some(version) = version else {
            return Ok(None);
        };

        let dimension: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        let dimension: usize = dimension
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| IndexError::Storage("missing dimension metadata".to_string()))?;

        let rows = sqlx::query(
            "SELECT doc_id, text, embedding FROM embedding_records ORDER BY doc_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let doc_id: i64 = row.get("doc_id");
            let text: String = row.get("text");
            let embedding_bytes: Vec<u8> = row.get("embedding");
            records.push(EmbeddingRecord {
                document: Document {
                    id: doc_id as u64,
                    text,
                },
                vector: deserialize_embedding(&embedding_bytes),
            });
        }

        Ok(Some(EmbeddingIndex::restore(version, dimension, records)?))
    }
}

fn storage(err: sqlx::Error) -> IndexError {
    IndexError::Storage(err.to_string())
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::service::LlmConfig;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::{Embedder, LlmService};

    async fn test_store() -> SqliteIndexStore {
        let tmp = std::env::temp_dir().join(format!(
            "tablechat-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteIndexStore::with_path(tmp).await.unwrap()
    }

    fn embedder(provider: Arc<ScriptedProvider>, model: &str) -> Embedder {
        Embedder::new(
            LlmService::new(provider, LlmConfig::default()),
            model.to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.set_embedding("city: Lyon", vec![0.0, 1.0, 0.0]);
        let embedder = embedder(provider.clone(), "embed-v1");

        let index = EmbeddingIndex::build(
            vec![Document {
                id: 0,
                text: "city: Lyon".to_string(),
            }],
            &embedder,
        )
        .await
        .unwrap();

        let store = test_store().await;
        store.save(&index).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.version(), "embed-v1");
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.len(), 1);

        let result = loaded.search(&[0.0, 1.0, 0.0], 1);
        assert_eq!(result.matches[0].document.text, "city: Lyon");
        assert!(result.matches[0].score > 0.99);
    }

    #[tokio::test]
    async fn empty_store_loads_nothing() {
        let store = test_store().await;
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_version_is_detectable_after_load() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.set_embedding("a", vec![1.0, 0.0, 0.0]);
        let old = embedder(provider.clone(), "embed-v1");

        let index = EmbeddingIndex::build(
            vec![Document {
                id: 0,
                text: "a".to_string(),
            }],
            &old,
        )
        .await
        .unwrap();

        let store = test_store().await;
        store.save(&index).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        let newer = embedder(provider.clone(), "embed-v2");
        let docs = vec![Document {
            id: 0,
            text: "a".to_string(),
        }];
        assert!(loaded.needs_rebuild(&docs, &newer));
    }
}
