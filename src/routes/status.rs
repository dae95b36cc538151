//! `GET /api/status` - the current dashboard view as JSON.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::debug;

use crate::dashboard::{DashboardView, SharedView};
use crate::Config;

// ---

#[derive(Serialize)]
struct StatusResponse {
    refresh_secs: u64,
    view: DashboardView,
}

pub fn router() -> Router<(SharedView, Config)> {
    // ---
    Router::new().route("/api/status", get(handler))
}

async fn handler(State((view, config)): State<(SharedView, Config)>) -> Json<StatusResponse> {
    // ---
    debug!("GET /api/status");
    let view = view.read().await.clone();
    Json(StatusResponse {
        refresh_secs: config.refresh.as_secs(),
        view,
    })
}
