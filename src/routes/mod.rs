//! HTTP gateway for the live dashboard.
//!
//! Each sibling module exports a subrouter; this module merges them and binds
//! the shared state, so `main.rs` never needs to know individual endpoints.

use axum::Router;

use crate::dashboard::SharedView;
use crate::Config;

mod health;
mod page;
mod status;

pub use page::render_page;

// ---

pub fn router(view: SharedView, config: Config) -> Router {
    // ---
    Router::new()
        .merge(page::router())
        .merge(status::router())
        .merge(health::router())
        .with_state((view, config))
}
