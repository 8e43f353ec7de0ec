use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct Liveness {
    ok: bool,
}

pub(crate) async fn root() -> Json<Liveness> {
    Json(Liveness { ok: true })
}
