//! Messaging-platform webhook: follow events subscribe the sender.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebhookPayload {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    source: Option<EventSource>,
}

#[derive(Debug, Deserialize)]
struct EventSource {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    ok: bool,
    users: usize,
    updated: usize,
    pushed: usize,
    push_failed: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

/// Follower ids in event order, without blanks or repeats.
fn follower_ids(payload: WebhookPayload) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for event in payload.events {
        if event.kind != "follow" {
            continue;
        }
        let Some(id) = event.source.and_then(|source| source.user_id) else {
            continue;
        };
        let id = id.trim();
        if !id.is_empty() && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

pub(crate) async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let followers = follower_ids(payload);
    info!(followers = followers.len(), "webhook received");

    match state.service().welcome(&followers, Utc::now()).await {
        Ok(report) => {
            let body = Json(WebhookResponse {
                ok: true,
                users: report.users,
                updated: report.updated,
                pushed: report.pushed,
                push_failed: report.push_failed,
            });
            (StatusCode::OK, body).into_response()
        }
        Err(error) => {
            error!(error = ?error, "webhook handling failed");
            let body = Json(ErrorResponse {
                ok: false,
                error: format!("{error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use serde_json::json;

    use crate::api::test_support::{Outbox, app, send_json};

    fn post(body: &serde_json::Value) -> Request<Body> {
        Request::post("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    #[test]
    fn only_follow_events_with_user_ids_count() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "events": [
                {"type": "follow", "source": {"userId": "U1"}},
                {"type": "message", "source": {"userId": "U2"}},
                {"type": "follow", "source": {}},
                {"type": "follow"},
                {"type": "follow", "source": {"userId": "U1"}},
                {"type": "follow", "source": {"userId": " U3 "}}
            ]
        }))
        .unwrap();
        assert_eq!(follower_ids(payload), vec!["U1", "U3"]);
    }

    #[tokio::test]
    async fn follow_registers_and_welcomes() {
        let outbox = Arc::new(Outbox::default());
        let body = json!({"events": [{"type": "follow", "source": {"userId": "U1"}}]});

        let (status, payload) = send_json(app(Arc::clone(&outbox)), post(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            payload,
            json!({"ok": true, "users": 1, "updated": 1, "pushed": 1, "push_failed": 0})
        );
        assert_eq!(*outbox.sent.lock().unwrap(), vec!["U1"]);
    }

    #[tokio::test]
    async fn returning_follower_is_welcomed_again() {
        let outbox = Arc::new(Outbox::default());
        let body = json!({"events": [{"type": "follow", "source": {"userId": "U1"}}]});
        let app = app(Arc::clone(&outbox));

        send_json(app.clone(), post(&body)).await;
        let (status, payload) = send_json(app, post(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            payload,
            json!({"ok": true, "users": 1, "updated": 0, "pushed": 1, "push_failed": 0})
        );
        assert_eq!(*outbox.sent.lock().unwrap(), vec!["U1", "U1"]);
    }

    #[tokio::test]
    async fn empty_payload_is_acknowledged() {
        let outbox = Arc::new(Outbox::default());
        let (status, payload) = send_json(app(Arc::clone(&outbox)), post(&json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["updated"], 0);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }
}
