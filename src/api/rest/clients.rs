use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};

use crate::infrastructure::state::AppState;
use crate::services::errors::ServiceError;

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/clients", get(clients))
}

async fn clients(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (axum::http::StatusCode, Json<serde_json::Value>)> {
    let names = state
        .rows
        .distinct_clients()
        .await
        .map_err(ServiceError::from)
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "clients": names })))
}
