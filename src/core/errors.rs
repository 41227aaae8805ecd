use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures raised while loading or accessing a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("empty input: no header row")]
    Empty,
    #[error("read error: {0}")]
    Read(String),
    #[error("no table loaded")]
    NotLoaded,
}

/// Structured failures from query validation and execution.
///
/// These are values the caller inspects, never faults: the planner retries
/// on them, the pipeline translates them into user-facing responses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("unknown column: {0}")]
    Schema(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Failures at the language-model / embedding service boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model response invalid: {0}")]
    ResponseInvalid(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Terminal planner outcome after the retry budget is spent.
#[derive(Debug, Error)]
#[error("planning failed: {reason}")]
pub struct PlanningFailure {
    pub reason: String,
    /// The model's last raw attempt, kept for diagnostics.
    pub last_attempt: Option<String>,
}

/// Why a plan() call did not produce an expression.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Transport-level failure; retrying validation cannot fix an outage.
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Failure(#[from] PlanningFailure),
}

/// Failures from the embedding index and its persistence layer.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding version mismatch: index built with '{existing}', requested '{requested}'")]
    VersionMismatch { existing: String, requested: String },
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("index not built")]
    NotBuilt,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::NotLoaded => ApiError::NotFound("no table loaded".to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable(_) | ModelError::Timeout(_) => ApiError::ServiceUnavailable,
            ModelError::ResponseInvalid(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Model(model) => model.into(),
            IndexError::NotBuilt => ApiError::NotFound("no index built".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
