// Presentation layer - HTTP surface over the dashboard service
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::*;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/host/mounted", get(host_mounted))
        .route("/host/message", post(host_message))
        .route("/host/context", get(host_context))
        .route("/import", post(import_project))
        .route("/refresh", post(refresh))
        .route("/new-files", get(new_files))
        .route("/new-files/accept", post(accept_new_files))
        .route("/tags", get(list_tags))
        .route("/files", get(list_files))
        .route("/show-tags", put(set_show_tags))
        .route("/step", put(set_step))
        .route("/polymerize", put(set_polymerize))
        .route("/check", put(set_check))
        .route("/smoothing", put(edit_smoothing))
        .route("/view", get(view))
        .route("/table", get(table))
        .route("/comparison", get(comparison))
        .route("/export.csv", get(export_csv))
        .route("/notifications", get(notifications))
        .route("/events", get(store_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
