pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod subscribers;
pub(crate) mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/users", get(subscribers::count))
        .route("/metrics", get(metrics::exporter))
        .route("/webhook", post(webhook::receive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
