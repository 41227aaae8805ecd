use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoadTableRequest {
    /// Server-side path to a delimited text file.
    pub path: String,
}

/// Loads a table from a server-side path and rebuilds the embedding index.
/// Malformed rows come back in the response, never silently dropped.
pub async fn load_table(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadTableRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issues = state
        .tables
        .load_from_path(std::path::Path::new(&request.path))?;
    let indexed = state.qa.ensure_index().await?;
    let table = state.tables.snapshot()?;

    Ok(Json(json!({
        "rows": table.row_count(),
        "columns": table.schema.arity(),
        "indexed_documents": indexed,
        "malformed_rows": issues,
    })))
}

/// Accepts a multipart file upload, loads it as the active table, and
/// rebuilds the embedding index.
pub async fn upload_table(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut content: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
            content = Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| ApiError::BadRequest("upload is not valid UTF-8".to_string()))?,
            );
        }
    }

    let content =
        content.ok_or_else(|| ApiError::BadRequest("missing 'file' field".to_string()))?;

    let issues = state.tables.load_from_str(&content)?;
    let indexed = state.qa.ensure_index().await?;
    let table = state.tables.snapshot()?;

    Ok(Json(json!({
        "rows": table.row_count(),
        "columns": table.schema.arity(),
        "indexed_documents": indexed,
        "malformed_rows": issues,
    })))
}

pub async fn get_schema(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let schema = state.tables.schema()?;
    Ok(Json(json!({ "columns": schema.columns })))
}
