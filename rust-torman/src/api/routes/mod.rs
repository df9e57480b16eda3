//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod jobs;
pub mod ws;

use axum::routing::get;
use axum::{Json, Router};

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(api_info))
        .nest("/api/torrents", jobs::router())
        .nest("/health", health::router())
        .route("/ws", get(ws::push_updates))
        .with_state(state)
}

/// Service banner.
async fn api_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "rust-torman API",
        "status": "running",
    }))
}
