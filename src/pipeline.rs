//! End-to-end question answering over the loaded table.
//!
//! Generation path: plan -> execute -> compose. RAG path: retrieve ->
//! compose. Each question runs synchronously through its path; failure
//! kinds are translated per one policy: planner validation exhaustion and
//! post-validation execution oddities become a graceful "couldn't answer"
//! reply, while resource-budget violations and model outages surface as
//! request failures.

use std::sync::Arc;

use serde::Deserialize;

use crate::answer::AnswerComposer;
use crate::core::config::AppConfig;
use crate::core::errors::{ApiError, PlanError, QueryError};
use crate::llm::{Embedder, LlmService};
use crate::query::planner::QueryPlanner;
use crate::query::sandbox::{self, ExecutionLimits};
use crate::rag::chunker;
use crate::rag::index::{EmbeddingIndex, IndexHandle};
use crate::rag::retriever::Retriever;
use crate::rag::store::SqliteIndexStore;
use crate::table::store::TableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Plan a query expression and execute it in the sandbox.
    #[default]
    Query,
    /// Retrieve similar rows and answer from that context.
    Rag,
}

pub struct QaService {
    config: AppConfig,
    planner: QueryPlanner,
    retriever: Retriever,
    composer: AnswerComposer,
    tables: Arc<TableStore>,
    index: Arc<IndexHandle>,
    index_store: Option<Arc<SqliteIndexStore>>,
}

impl QaService {
    pub fn new(
        config: AppConfig,
        llm: LlmService,
        embedder: Embedder,
        tables: Arc<TableStore>,
        index: Arc<IndexHandle>,
        index_store: Option<Arc<SqliteIndexStore>>,
    ) -> Self {
        let planner = QueryPlanner::new(llm.clone(), config.query.plan_retries);
        let retriever = Retriever::new(embedder);
        let composer = AnswerComposer::new(llm, config.retrieval.max_context_chars);
        Self {
            config,
            planner,
            retriever,
            composer,
            tables,
            index,
            index_store,
        }
    }

    pub async fn answer(&self, question: &str, mode: AnswerMode) -> Result<String, ApiError> {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(%request_id, ?mode, "answering question");

        match mode {
            AnswerMode::Query => self.answer_with_query(request_id, question).await,
            AnswerMode::Rag => self.answer_with_retrieval(request_id, question).await,
        }
    }

    async fn answer_with_query(
        &self,
        request_id: uuid::Uuid,
        question: &str,
    ) -> Result<String, ApiError> {
        let table = self.tables.snapshot()?;

        let expr = match self.planner.plan(question, &table).await {
            Ok(expr) => expr,
            Err(PlanError::Model(err)) => return Err(err.into()),
            Err(PlanError::Failure(failure)) => {
                tracing::warn!(%request_id, reason = %failure.reason, "planning failed");
                return Ok(format!(
                    "I couldn't turn that question into a data query ({}).",
                    failure.reason
                ));
            }
        };
        tracing::debug!(%request_id, ?expr, "planned query expression");

        let limits = ExecutionLimits::from_config(&self.config.query);
        let result = match sandbox::execute(&table, &expr, &limits) {
            Ok(result) => result,
            Err(err @ QueryError::LimitExceeded(_)) => {
                // the expression was valid; the caller cannot remedy this
                return Err(ApiError::BadRequest(err.to_string()));
            }
            Err(err) => {
                tracing::warn!(%request_id, %err, "validated expression failed to execute");
                return Ok(format!("I couldn't answer that from the data ({err})."));
            }
        };
        tracing::debug!(%request_id, "query executed");

        let answer = self
            .composer
            .compose_from_query_result(question, &result)
            .await?;
        tracing::info!(%request_id, "answer composed");
        Ok(answer)
    }

    async fn answer_with_retrieval(
        &self,
        request_id: uuid::Uuid,
        question: &str,
    ) -> Result<String, ApiError> {
        let index = self.index.snapshot()?;
        let retrieval = self
            .retriever
            .retrieve(
                question,
                &index,
                self.config.retrieval.top_k,
                self.config.retrieval.score_threshold,
            )
            .await?;
        tracing::debug!(%request_id, matches = retrieval.len(), "retrieved context rows");

        let answer = self
            .composer
            .compose_from_context(question, &retrieval)
            .await?;
        tracing::info!(%request_id, "answer composed");
        Ok(answer)
    }

    /// Chunks the current table and (re)builds the embedding index when the
    /// embedder version, dimensionality, or chunker output changed. The new
    /// index is installed only after the build fully completes, so
    /// in-flight searches keep their snapshot and a cancelled build changes
    /// nothing. Returns the number of indexed documents.
    pub async fn ensure_index(&self) -> Result<usize, ApiError> {
        let table = self.tables.snapshot()?;
        let documents = chunker::chunk(&table);
        let embedder = self.retriever.embedder();

        if let Ok(current) = self.index.snapshot() {
            if !current.needs_rebuild(&documents, embedder) {
                return Ok(current.len());
            }
            tracing::info!("embedding index is stale; rebuilding");
        }

        let built = EmbeddingIndex::build(documents, embedder).await?;
        let count = built.len();

        if let Some(store) = &self.index_store {
            if let Err(err) = store.save(&built).await {
                tracing::warn!(%err, "failed to persist embedding index");
            }
        }

        self.index.install(built);
        tracing::info!(documents = count, "embedding index built");
        Ok(count)
    }
}
