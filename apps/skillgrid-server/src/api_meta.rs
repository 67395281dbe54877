use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::{responses, AppState};

pub async fn healthz() -> Response {
    responses::ok(json!({"ok": true}))
}

pub async fn about(State(state): State<AppState>) -> Response {
    responses::ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "state_dir": state.kernel().state_dir().display().to_string(),
        "docs": "/spec/openapi.json",
    }))
}
