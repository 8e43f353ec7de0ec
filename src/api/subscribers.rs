use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

pub(crate) async fn count(State(state): State<AppState>) -> impl IntoResponse {
    match state.service().subscriber_count().await {
        Ok(count) => (StatusCode::OK, Json(CountResponse { count })).into_response(),
        Err(error) => {
            error!(error = ?error, "subscriber count failed");
            let body = Json(ErrorResponse {
                ok: false,
                error: format!("{error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
