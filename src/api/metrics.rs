use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::app::AppState;

pub(crate) async fn exporter(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.telemetry().render_prometheus()).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::api::test_support::{Outbox, app, send};

    #[tokio::test]
    async fn exposes_digest_metrics() {
        let request = Request::get("/metrics")
            .body(Body::empty())
            .expect("request builds");
        let (status, body) = send(app(Arc::new(Outbox::default())), request).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).expect("utf8");
        assert!(text.contains("digest_runs_total"));
    }
}
