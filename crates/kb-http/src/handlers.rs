use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use kb_core::{
    domain::{Channel, ExtractionSummary, KnowledgeItem, KnowledgeStats},
    validation::{validate_extract, validate_search, FieldError},
};

use crate::{error::ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ChannelsQuery {
    pub refresh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelsQuery>,
) -> Json<Vec<Channel>> {
    let refresh = query.refresh.as_deref() == Some("true");
    Json(state.service.list_channels(refresh).await)
}

pub async fn extract(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExtractionSummary>, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::validation(vec![FieldError::new(
            "body",
            format!("Request body must be JSON: {e}"),
        )])
    })?;
    let params = validate_extract(&body).map_err(ApiError::validation)?;

    // A panic inside the pipeline surfaces as a JoinError here.
    let service = state.service.clone();
    let summary = tokio::spawn(async move {
        service
            .extract(&params.channel_ids, params.days_back)
            .await
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "extraction task failed");
        ApiError::internal("Extraction failed")
    })?;

    Ok(Json(summary))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<KnowledgeItem>>, ApiError> {
    let params = validate_search(query.q.as_deref(), query.category.as_deref())
        .map_err(ApiError::validation)?;
    let results = state
        .service
        .store()
        .search(&params.query, params.category)
        .await;
    Ok(Json(results))
}

pub async fn stats(State(state): State<AppState>) -> Json<KnowledgeStats> {
    Json(state.service.store().stats().await)
}

pub async fn knowledge(State(state): State<AppState>) -> Json<Vec<KnowledgeItem>> {
    Json(state.service.store().load().await)
}
