// Health and root routes

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "LLM Chat API", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
