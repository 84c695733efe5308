use std::sync::Arc;

use axum::{extract::Extension, routing::post, Json, Router};

use crate::{
    infrastructure::state::AppState,
    services::search::{SearchResponse, SearchService},
    services::ReportParams,
};

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/search", post(search))
}

async fn search(
    Extension(state): Extension<Arc<AppState>>,
    Json(params): Json<ReportParams>,
) -> Result<Json<SearchResponse>, (axum::http::StatusCode, Json<serde_json::Value>)> {
    let service = SearchService::new(state);
    let response = service.search(params).await.map_err(to_response)?;
    Ok(Json(response))
}
