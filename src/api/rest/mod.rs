use axum::{routing::get, Json, Router};

use crate::services::errors::ServiceError;

pub mod clients;
pub mod dashboard;
pub mod health;
pub mod search;
pub mod summary;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::healthcheck))
        .merge(dashboard::router())
        .merge(summary::router())
        .merge(search::router())
        .merge(clients::router())
}

pub(crate) fn to_response(err: ServiceError) -> (axum::http::StatusCode, Json<serde_json::Value>) {
    (
        err.status_code(),
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}
