use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::modules::time_reports::use_cases::sync_weekly_reports::inbound::http as reports_http;
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/weeks", get(reports_http::weeks))
        .route("/status", get(reports_http::status))
        .route("/reload", post(reports_http::reload))
        .route("/navigate", post(reports_http::navigate))
        .route("/settings", put(reports_http::update_settings))
        .route("/push", post(reports_http::push))
        .route("/connectivity", post(reports_http::connectivity))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
