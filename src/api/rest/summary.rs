use std::sync::Arc;

use axum::{extract::Extension, routing::post, Json, Router};

use crate::{
    infrastructure::state::AppState,
    services::summary::SummaryService,
    services::ReportParams,
};

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/summary", post(summary))
}

async fn summary(
    Extension(state): Extension<Arc<AppState>>,
    Json(params): Json<ReportParams>,
) -> Result<Json<serde_json::Value>, (axum::http::StatusCode, Json<serde_json::Value>)> {
    let service = SummaryService::new(state);
    let response = service.summary(params).await.map_err(to_response)?;
    Ok(Json(response))
}
