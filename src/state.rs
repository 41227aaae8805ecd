use std::sync::Arc;

use thiserror::Error;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::errors::{ApiError, IndexError};
use crate::llm::{Embedder, LlmProvider, LlmService, OpenAiCompatProvider};
use crate::pipeline::QaService;
use crate::rag::index::IndexHandle;
use crate::rag::store::SqliteIndexStore;
use crate::table::store::TableStore;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("configuration error: {0}")]
    Config(ApiError),
    #[error("index store error: {0}")]
    IndexStore(IndexError),
}

/// Global application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub llm: LlmService,
    pub tables: Arc<TableStore>,
    pub index: Arc<IndexHandle>,
    pub qa: Arc<QaService>,
}

impl AppState {
    /// Wires configuration, the model provider, the table store, the
    /// embedding index (restoring a persisted one when its version tag
    /// still matches the active embedder), and the QA pipelines.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config_service = ConfigService::new(paths.clone());
        let config = config_service
            .load_config()
            .map_err(InitializationError::Config)?;

        let chat_provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
        ));
        let llm = LlmService::new(chat_provider.clone(), config.llm.clone());

        let embed_provider: Arc<dyn LlmProvider> = match &config.embedding.base_url {
            Some(url) => Arc::new(OpenAiCompatProvider::new(
                url.clone(),
                config.llm.api_key.clone(),
            )),
            None => chat_provider,
        };
        let embedder = Embedder::new(
            LlmService::new(embed_provider, config.llm.clone()),
            config.embedding.model.clone(),
            config.embedding.dimension,
        );

        let tables = Arc::new(TableStore::new());
        let index = Arc::new(IndexHandle::new());

        let index_store = Arc::new(
            SqliteIndexStore::new(&paths)
                .await
                .map_err(InitializationError::IndexStore)?,
        );

        match index_store.load().await {
            Ok(Some(persisted)) if persisted.version() == embedder.version() => {
                tracing::info!(documents = persisted.len(), "restored persisted embedding index");
                index.install(persisted);
            }
            Ok(Some(persisted)) => {
                tracing::info!(
                    stored = persisted.version(),
                    active = embedder.version(),
                    "persisted index has a stale embedder version; a rebuild will replace it"
                );
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "failed to load persisted embedding index");
            }
        }

        let qa = Arc::new(QaService::new(
            config.clone(),
            llm.clone(),
            embedder,
            tables.clone(),
            index.clone(),
            Some(index_store),
        ));

        Ok(Arc::new(AppState {
            paths,
            config,
            llm,
            tables,
            index,
            qa,
        }))
    }
}
