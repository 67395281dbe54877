//! Admin surface: allow-lists, the analysis kill-switch, and the advisory
//! worker-pool URL.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use skillgrid_core::Identity;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

#[derive(Deserialize, ToSchema)]
pub(crate) struct IdentityReq {
    pub identity: Identity,
}

pub async fn admin_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IdentityReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().add_admin(&caller, &req.identity), |()| {
        responses::ok(json!({"ok": true}))
    })
}

/// Register a worker identity (learned out-of-band via `/whoami`).
#[utoipa::path(
    post,
    path = "/admin/workers",
    tag = "Admin",
    request_body = IdentityReq,
    responses(
        (status = 200, description = "Registered", body = serde_json::Value),
        (status = 401, description = "Admin role required")
    )
)]
pub async fn worker_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IdentityReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().add_worker(&caller, &req.identity), |()| {
        responses::ok(json!({"ok": true}))
    })
}

pub async fn worker_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IdentityReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().remove_worker(&caller, &req.identity), |()| {
        responses::ok(json!({"ok": true}))
    })
}

pub async fn workers_list(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().get_workers(&caller), |workers| {
        responses::ok(json!({"workers": workers}))
    })
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct AnalysisEnabledReq {
    pub enabled: bool,
}

/// The kill-switch. Blocks new submissions only; in-flight jobs finish.
pub async fn analysis_enabled_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AnalysisEnabledReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().set_analysis_enabled(&caller, req.enabled),
        |()| responses::ok(json!({"ok": true})),
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct WorkerUrlReq {
    pub url: String,
}

pub async fn tee_worker_url_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WorkerUrlReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().set_tee_worker_url(&caller, req.url), |()| {
        responses::ok(json!({"ok": true}))
    })
}

/// Public read: clients fetch the worker pool's URL to get its public key.
pub async fn tee_worker_url(State(state): State<AppState>) -> Response {
    responses::ok(json!({"url": state.kernel().get_tee_worker_url()}))
}
