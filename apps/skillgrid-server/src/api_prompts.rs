//! Prompt registry surface. Reads are open (clients display the template a
//! report was produced from); writes are admin-only.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

#[derive(Deserialize, ToSchema)]
pub(crate) struct CreatePromptReq {
    pub name: String,
    pub version: String,
    pub prompt_template: String,
}

#[utoipa::path(
    post,
    path = "/prompts",
    tag = "Prompts",
    request_body = CreatePromptReq,
    responses((status = 201, description = "Created", body = serde_json::Value))
)]
pub async fn prompt_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePromptReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .create_prompt(&caller, req.name, req.version, req.prompt_template),
        |id| responses::created(json!({"prompt_id": id})),
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct PromptIdReq {
    pub prompt_id: String,
}

/// Flip the default flag; the previous default loses it atomically.
pub async fn prompt_set_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PromptIdReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().set_default_prompt(&caller, &req.prompt_id),
        |()| responses::ok(json!({"ok": true})),
    )
}

pub async fn prompt_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().delete_prompt(&caller, &id), |()| {
        responses::ok(json!({"ok": true}))
    })
}

pub async fn prompts_list(State(state): State<AppState>) -> Response {
    responses::ok(json!({"prompts": state.kernel().list_prompts()}))
}

pub async fn prompt_default(State(state): State<AppState>) -> Response {
    responses::ok(json!({"prompt": state.kernel().get_default_prompt()}))
}

pub async fn prompt_get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.kernel().get_prompt(&id) {
        Some(prompt) => responses::ok(prompt),
        None => responses::core_error(skillgrid_core::CoreError::not_found(format!(
            "prompt not found: {id}"
        ))),
    }
}
