//! Analysis queue surface: submission, worker claim/complete/fail, and the
//! polling endpoints clients sit on until a job goes terminal.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use skillgrid_events::topics;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

#[derive(Deserialize, ToSchema)]
pub(crate) struct AnalysisReq {
    pub skill_id: String,
    pub model: String,
}

/// Submit an analysis request; returns the job id to poll. Idempotent for
/// an identical live submission.
#[utoipa::path(
    post,
    path = "/jobs/analysis",
    tag = "Jobs",
    request_body = AnalysisReq,
    responses(
        (status = 201, description = "Job queued (or already live)", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown skill"),
        (status = 412, description = "Kill-switch off or credential missing")
    )
)]
pub async fn analysis_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AnalysisReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .request_analysis(&caller, &req.skill_id, &req.model),
        |job_id| {
            state.bus().publish(
                topics::TOPIC_JOBS_SUBMITTED,
                &json!({"job_id": job_id, "skill_id": req.skill_id, "model": req.model}),
            );
            responses::created(json!({"job_id": job_id}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct ClaimReq {
    #[serde(default = "default_claim_limit")]
    pub limit: u32,
}

fn default_claim_limit() -> u32 {
    10
}

/// Worker pull: hand out up to `limit` pending jobs in FIFO order. An
/// empty queue yields an empty list, not an error.
#[utoipa::path(
    post,
    path = "/jobs/analysis/claim",
    tag = "Jobs",
    request_body = ClaimReq,
    responses(
        (status = 200, description = "Claimed jobs with skill snapshots", body = serde_json::Value),
        (status = 401, description = "Not a registered worker")
    )
)]
pub async fn analysis_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ClaimReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().claim_pending_jobs(&caller, req.limit),
        |jobs| {
            if !jobs.is_empty() {
                state.bus().publish(
                    topics::TOPIC_JOBS_CLAIMED,
                    &json!({"count": jobs.len(), "worker": caller}),
                );
            }
            responses::ok(json!({"jobs": jobs}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct ResultReq {
    pub job_id: String,
    pub analysis_json: String,
}

/// Compatibility completion without provenance metadata.
#[utoipa::path(
    post,
    path = "/jobs/analysis/result",
    tag = "Jobs",
    request_body = ResultReq,
    responses(
        (status = 200, description = "Recorded (idempotent)", body = serde_json::Value),
        (status = 400, description = "Malformed analysis payload")
    )
)]
pub async fn analysis_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResultReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .submit_job_result(&caller, &req.job_id, &req.analysis_json),
        |()| {
            state
                .bus()
                .publish(topics::TOPIC_JOBS_COMPLETED, &json!({"job_id": req.job_id}));
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct ResultMetaReq {
    pub job_id: String,
    pub analysis_json: String,
    #[serde(default)]
    pub tee_worker_version: String,
    #[serde(default)]
    pub prompt_version: String,
}

/// Canonical completion path with TEE and prompt provenance.
#[utoipa::path(
    post,
    path = "/jobs/analysis/result_meta",
    tag = "Jobs",
    request_body = ResultMetaReq,
    responses(
        (status = 200, description = "Recorded (idempotent)", body = serde_json::Value),
        (status = 400, description = "Malformed analysis payload"),
        (status = 409, description = "Job not in a completable state")
    )
)]
pub async fn analysis_result_meta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResultMetaReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().submit_job_result_with_metadata(
            &caller,
            &req.job_id,
            &req.analysis_json,
            &req.tee_worker_version,
            &req.prompt_version,
        ),
        |()| {
            state
                .bus()
                .publish(topics::TOPIC_JOBS_COMPLETED, &json!({"job_id": req.job_id}));
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct JobErrorReq {
    pub job_id: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/jobs/analysis/error",
    tag = "Jobs",
    request_body = JobErrorReq,
    responses((status = 200, description = "Failure recorded", body = serde_json::Value))
)]
pub async fn analysis_error(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<JobErrorReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .submit_job_error(&caller, &req.job_id, &req.message),
        |()| {
            state.bus().publish(
                topics::TOPIC_JOBS_FAILED,
                &json!({"job_id": req.job_id, "error": req.message}),
            );
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct CancelReq {
    pub job_id: String,
}

/// Requester (or admin) cancellation.
#[utoipa::path(
    post,
    path = "/jobs/analysis/cancel",
    tag = "Jobs",
    request_body = CancelReq,
    responses(
        (status = 200, description = "Cancelled", body = serde_json::Value),
        (status = 412, description = "Job already terminal")
    )
)]
pub async fn analysis_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CancelReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().cancel_analysis_job(&caller, &req.job_id),
        |()| {
            state
                .bus()
                .publish(topics::TOPIC_JOBS_CANCELLED, &json!({"job_id": req.job_id}));
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize)]
pub(crate) struct JobStatusQuery {
    pub id: String,
}

/// Poll endpoint: `(status, error?)` for one job.
pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobStatusQuery>,
) -> Response {
    responses::respond(state.kernel().get_job_status(&query.id), |(status, error)| {
        responses::ok(json!({"status": status, "error": error}))
    })
}

#[derive(Deserialize)]
pub(crate) struct ListJobsQuery {
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    50
}

pub async fn jobs_list(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    responses::ok(json!({"jobs": state.kernel().list_analysis_jobs(query.limit)}))
}

pub async fn jobs_pending_count(State(state): State<AppState>) -> Response {
    responses::ok(json!({"pending": state.kernel().get_pending_job_count()}))
}
