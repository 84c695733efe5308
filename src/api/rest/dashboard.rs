use std::sync::Arc;

use axum::{extract::Extension, routing::post, Json, Router};

use crate::{
    infrastructure::state::AppState,
    services::dashboard::{DashboardResponse, DashboardService},
    services::ReportParams,
};

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/dashboard", post(dashboard))
}

async fn dashboard(
    Extension(state): Extension<Arc<AppState>>,
    Json(params): Json<ReportParams>,
) -> Result<Json<DashboardResponse>, (axum::http::StatusCode, Json<serde_json::Value>)> {
    let service = DashboardService::new(state);
    let response = service.dashboard(params).await.map_err(to_response)?;
    Ok(Json(response))
}
