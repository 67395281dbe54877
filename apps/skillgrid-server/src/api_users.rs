//! Profile surface: whoami, encrypted credential custody, and the caller's
//! own profile record.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

/// Identity echo. Workers use this to learn the identity an admin must
/// allow-list; anonymous callers get `null`.
pub async fn whoami(headers: HeaderMap) -> Response {
    responses::ok(json!({"identity": identity::caller(&headers)}))
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct CredentialReq {
    /// Hex-encoded `iv || auth_tag || ciphertext`, produced client-side
    /// against the worker pool's published key.
    pub encrypted_credential: String,
}

/// Store or replace the caller's encrypted credential.
#[utoipa::path(
    put,
    path = "/me/credential",
    tag = "Profile",
    request_body = CredentialReq,
    responses(
        (status = 200, description = "Stored", body = serde_json::Value),
        (status = 400, description = "Not hex or out of bounds")
    )
)]
pub async fn credential_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CredentialReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .set_encrypted_credential(&caller, req.encrypted_credential),
        |()| responses::ok(json!({"ok": true})),
    )
}

pub async fn credential_remove(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().remove_encrypted_credential(&caller), |()| {
        responses::ok(json!({"ok": true}))
    })
}

pub async fn credential_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::ok(json!({"has_credential": state.kernel().has_credential(&caller)}))
}

pub async fn my_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::ok(json!({"profile": state.kernel().get_my_profile(&caller)}))
}
