use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "table_loaded": state.tables.is_loaded(),
        "index_built": state.index.is_built(),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let model_reachable = state.llm.health_check().await.unwrap_or(false);
    let indexed_documents = state
        .index
        .snapshot()
        .map(|index| index.len())
        .unwrap_or(0);
    let table_rows = state
        .tables
        .snapshot()
        .map(|table| table.row_count())
        .unwrap_or(0);

    Json(json!({
        "model_reachable": model_reachable,
        "table_rows": table_rows,
        "indexed_documents": indexed_documents,
    }))
}
