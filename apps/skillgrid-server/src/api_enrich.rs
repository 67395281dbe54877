//! Enrichment queue surface: fetch requests, worker claim/complete, and
//! the polling endpoints. Mirrors the analysis surface with the extra
//! `NotFound` terminal outcome.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use skillgrid_core::{EnrichmentResult, EnrichmentStatus};
use skillgrid_events::topics;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

#[derive(Deserialize, ToSchema)]
pub(crate) struct EnrichmentReq {
    pub skill_id: String,
    #[serde(default)]
    pub auto_analyze: bool,
}

/// Queue a fetch of the skill's contents from the source host.
#[utoipa::path(
    post,
    path = "/jobs/enrichment",
    tag = "Enrichment",
    request_body = EnrichmentReq,
    responses(
        (status = 201, description = "Job queued (or already live)", body = serde_json::Value),
        (status = 412, description = "Auto-analyze without a stored credential")
    )
)]
pub async fn enrichment_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnrichmentReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .request_enrichment(&caller, &req.skill_id, req.auto_analyze),
        |job_id| {
            state.bus().publish(
                topics::TOPIC_ENRICH_SUBMITTED,
                &json!({"job_id": job_id, "skill_id": req.skill_id, "auto_analyze": req.auto_analyze}),
            );
            responses::created(json!({"job_id": job_id}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct EnrichmentBatchReq {
    pub limit: u32,
    #[serde(default)]
    pub auto_analyze: bool,
}

/// Admin sweep over skills still missing SKILL.md.
#[utoipa::path(
    post,
    path = "/jobs/enrichment/batch",
    tag = "Enrichment",
    request_body = EnrichmentBatchReq,
    responses((status = 200, description = "(queued, total_missing)", body = serde_json::Value))
)]
pub async fn enrichment_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnrichmentBatchReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .queue_enrichment_batch(&caller, req.limit, req.auto_analyze),
        |(queued, total_missing)| {
            responses::ok(json!({"queued": queued, "total_missing": total_missing}))
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

pub async fn enrichment_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ClaimReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().claim_enrichment_jobs(&caller, req.limit),
        |jobs| {
            if !jobs.is_empty() {
                state.bus().publish(
                    topics::TOPIC_ENRICH_CLAIMED,
                    &json!({"count": jobs.len(), "worker": caller}),
                );
            }
            responses::ok(json!({"jobs": jobs}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct EnrichmentResultReq {
    pub job_id: String,
    pub result: EnrichmentResult,
}

/// Worker result: stores fetched files on success, lands in `NotFound`
/// when the source host confirms absence, and chains the analysis job when
/// the request asked for it.
#[utoipa::path(
    post,
    path = "/jobs/enrichment/result",
    tag = "Enrichment",
    request_body = EnrichmentResultReq,
    responses((status = 200, description = "Recorded (idempotent)", body = serde_json::Value))
)]
pub async fn enrichment_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnrichmentResultReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .submit_enrichment_result(&caller, &req.job_id, req.result),
        |()| {
            let job = state.kernel().get_enrichment_job(&req.job_id);
            let topic = match job.as_ref().map(|j| j.status) {
                Some(EnrichmentStatus::NotFound) => topics::TOPIC_ENRICH_NOT_FOUND,
                _ => topics::TOPIC_ENRICH_COMPLETED,
            };
            state.bus().publish(
                topic,
                &json!({
                    "job_id": req.job_id,
                    "chained_analysis_job_id":
                        job.as_ref().and_then(|j| j.chained_analysis_job_id.clone()),
                }),
            );
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct JobErrorReq {
    pub job_id: String,
    pub message: String,
}

pub async fn enrichment_error(
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
            .submit_enrichment_error(&caller, &req.job_id, &req.message),
        |()| {
            state.bus().publish(
                topics::TOPIC_ENRICH_FAILED,
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

pub async fn enrichment_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CancelReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().cancel_enrichment_job(&caller, &req.job_id),
        |()| {
            state.bus().publish(
                topics::TOPIC_ENRICH_CANCELLED,
                &json!({"job_id": req.job_id}),
            );
            responses::ok(json!({"ok": true}))
        },
    )
}

#[derive(Deserialize)]
pub(crate) struct JobStatusQuery {
    pub id: String,
}

pub async fn enrichment_status(
    State(state): State<AppState>,
    Query(query): Query<JobStatusQuery>,
) -> Response {
    responses::respond(
        state.kernel().get_enrichment_job_status(&query.id),
        |(status, error)| responses::ok(json!({"status": status, "error": error})),
    )
}

pub async fn enrichment_pending_count(State(state): State<AppState>) -> Response {
    responses::ok(json!({"pending": state.kernel().get_pending_enrichment_count()}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::test_support::{bearer, test_state};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use skillgrid_core::EnrichmentFile;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn seed(state: &AppState) {
        let admin = identity::fingerprint("admin-token");
        let skill = serde_json::from_value::<skillgrid_core::Skill>(serde_json::json!({
            "id": "o/r", "name": "r", "description": "d", "owner": "o", "repo": "r",
            "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z",
            "source": "test"
        }))
        .unwrap();
        state.kernel().add_skill(&admin, skill).unwrap();
        let user = identity::fingerprint("user-token");
        state
            .kernel()
            .set_encrypted_credential(&user, "ab".repeat(40))
            .unwrap();
    }

    #[tokio::test]
    async fn enrichment_round_trip_with_auto_analyze() {
        let (state, _dir, _admin, _worker) = test_state();
        seed(&state);

        let response = enrichment_request(
            State(state.clone()),
            bearer("user-token"),
            Json(EnrichmentReq {
                skill_id: "o/r".into(),
                auto_analyze: true,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = enrichment_claim(
            State(state.clone()),
            bearer("worker-token"),
            Json(ClaimReq { limit: 10 }),
        )
        .await;
        let claimed = body_json(response).await;
        assert_eq!(claimed["jobs"][0]["job_id"], job_id.as_str());
        assert_eq!(claimed["jobs"][0]["auto_analyze"], true);

        let response = enrichment_result(
            State(state.clone()),
            bearer("worker-token"),
            Json(EnrichmentResultReq {
                job_id: job_id.clone(),
                result: EnrichmentResult {
                    found: true,
                    content: Some("# skill".into()),
                    source_url: Some("https://src.example/o/r".into()),
                    files_found: vec![EnrichmentFile {
                        path: "a.md".into(),
                        content: "extra".into(),
                    }],
                },
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let skill = state.kernel().get_skill("o/r").unwrap();
        assert_eq!(skill.files.len(), 2);
        let job = state.kernel().get_enrichment_job(&job_id).unwrap();
        assert!(job.chained_analysis_job_id.is_some());
        assert_eq!(state.kernel().get_pending_job_count(), 1);
    }

    #[tokio::test]
    async fn not_found_result_sets_the_distinct_status() {
        let (state, _dir, _admin, _worker) = test_state();
        seed(&state);
        let response = enrichment_request(
            State(state.clone()),
            bearer("user-token"),
            Json(EnrichmentReq {
                skill_id: "o/r".into(),
                auto_analyze: false,
            }),
        )
        .await;
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();
        enrichment_claim(
            State(state.clone()),
            bearer("worker-token"),
            Json(ClaimReq { limit: 10 }),
        )
        .await;
        enrichment_result(
            State(state.clone()),
            bearer("worker-token"),
            Json(EnrichmentResultReq {
                job_id: job_id.clone(),
                result: EnrichmentResult {
                    found: false,
                    content: None,
                    source_url: None,
                    files_found: vec![],
                },
            }),
        )
        .await;
        let response = enrichment_status(
            State(state),
            Query(JobStatusQuery { id: job_id }),
        )
        .await;
        assert_eq!(body_json(response).await["status"], "NotFound");
    }

    #[tokio::test]
    async fn batch_is_admin_gated() {
        let (state, _dir, _admin, _worker) = test_state();
        seed(&state);
        let response = enrichment_batch(
            State(state),
            bearer("user-token"),
            Json(EnrichmentBatchReq {
                limit: 10,
                auto_analyze: false,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
