//! Shared response envelopes: success bodies are plain JSON, failures are
//! `application/problem+json` shaped objects with the taxonomy category as
//! the title.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use skillgrid_core::CoreError;

pub(crate) fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub(crate) fn problem(status: StatusCode, title: &str, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": title,
            "status": status.as_u16(),
            "detail": detail,
        })),
    )
        .into_response()
}

pub(crate) fn unauthorized() -> Response {
    problem(
        StatusCode::UNAUTHORIZED,
        "Unauthorized",
        "authenticated identity required",
    )
}

/// Map a kernel error onto the wire. One status per taxonomy category so
/// clients can pattern-match without parsing detail text.
pub(crate) fn core_error(err: CoreError) -> Response {
    let (status, title) = match &err {
        CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
        CoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Invalid Argument"),
        CoreError::PreconditionFailed(_) => {
            (StatusCode::PRECONDITION_FAILED, "Precondition Failed")
        }
        CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
    };
    problem(status, title, &err.to_string())
}

/// Collapse a kernel result into a response via a success mapper.
pub(crate) fn respond<T, F>(result: skillgrid_core::Result<T>, f: F) -> Response
where
    F: FnOnce(T) -> Response,
{
    match result {
        Ok(value) => f(value),
        Err(err) => core_error(err),
    }
}
