//! Skill index surface: admin imports and file writes, install counting,
//! and the checksum/verification reads.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use skillgrid_core::{Skill, SkillFile};
use skillgrid_events::topics;
use utoipa::ToSchema;

use crate::{identity, responses, AppState};

/// Import one skill. The id must be the canonical `owner/repo[/name]`.
#[utoipa::path(
    post,
    path = "/skills",
    tag = "Skills",
    request_body = Skill,
    responses(
        (status = 201, description = "Inserted", body = serde_json::Value),
        (status = 400, description = "Id grammar or file validation failure"),
        (status = 409, description = "Duplicate id")
    )
)]
pub async fn skill_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(skill): Json<Skill>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().add_skill(&caller, skill), |id| {
        state
            .bus()
            .publish(topics::TOPIC_INDEX_UPDATED, &json!({"skill_id": id}));
        responses::created(json!({"skill_id": id}))
    })
}

/// Batch import; duplicates are skipped. Returns the inserted count.
#[utoipa::path(
    post,
    path = "/skills/batch",
    tag = "Skills",
    responses((status = 200, description = "Insert count", body = serde_json::Value))
)]
pub async fn skills_add_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(skills): Json<Vec<Skill>>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().add_skills_batch(&caller, skills), |count| {
        state
            .bus()
            .publish(topics::TOPIC_INDEX_UPDATED, &json!({"inserted": count}));
        responses::ok(json!({"inserted": count}))
    })
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct SetFilesReq {
    pub skill_id: String,
    pub files: Vec<SkillFile>,
}

/// Replace a skill's file set; returns the recomputed aggregate checksum.
#[utoipa::path(
    post,
    path = "/skills/files",
    tag = "Skills",
    request_body = SetFilesReq,
    responses((status = 200, description = "New aggregate checksum", body = serde_json::Value))
)]
pub async fn skill_set_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetFilesReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .set_skill_files(&caller, &req.skill_id, req.files),
        |checksum| {
            state.bus().publish(
                topics::TOPIC_INDEX_FILES_CHANGED,
                &json!({"skill_id": req.skill_id, "files_checksum": checksum}),
            );
            responses::ok(json!({"files_checksum": checksum}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct AddFileReq {
    pub skill_id: String,
    pub file: SkillFile,
}

pub async fn skill_add_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddFileReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state
            .kernel()
            .add_skill_file(&caller, &req.skill_id, req.file),
        |checksum| {
            state.bus().publish(
                topics::TOPIC_INDEX_FILES_CHANGED,
                &json!({"skill_id": req.skill_id, "files_checksum": checksum}),
            );
            responses::ok(json!({"files_checksum": checksum}))
        },
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct InstallReq {
    pub skill_id: String,
}

/// Count an install; returns the new counter value.
pub async fn skill_record_install(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InstallReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().record_install(&caller, &req.skill_id),
        |count| responses::ok(json!({"install_count": count})),
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct SkillIdReq {
    pub skill_id: String,
}

pub async fn skill_clear_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SkillIdReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().clear_analysis(&caller, &req.skill_id),
        |()| responses::ok(json!({"ok": true})),
    )
}

pub async fn skill_clear_analysis_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SkillIdReq>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(
        state.kernel().clear_analysis_history(&caller, &req.skill_id),
        |()| responses::ok(json!({"ok": true})),
    )
}

pub async fn skills_sync_installs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(data): Json<Vec<(String, u64)>>,
) -> Response {
    let Some(caller) = identity::caller(&headers) else {
        return responses::unauthorized();
    };
    responses::respond(state.kernel().sync_install_counts(&caller, data), |n| {
        responses::ok(json!({"updated": n}))
    })
}

#[derive(Deserialize)]
pub(crate) struct SkillQuery {
    pub id: String,
}

pub async fn skill_get(State(state): State<AppState>, Query(q): Query<SkillQuery>) -> Response {
    match state.kernel().get_skill(&q.id) {
        Some(skill) => responses::ok(skill),
        None => responses::core_error(skillgrid_core::CoreError::not_found(format!(
            "skill not found: {}",
            q.id
        ))),
    }
}

pub async fn skill_files(State(state): State<AppState>, Query(q): Query<SkillQuery>) -> Response {
    responses::respond(state.kernel().get_skill_files(&q.id), |files| {
        responses::ok(json!({"files": files}))
    })
}

#[derive(Deserialize)]
pub(crate) struct SkillFileQuery {
    pub id: String,
    pub path: String,
}

pub async fn skill_file(
    State(state): State<AppState>,
    Query(q): Query<SkillFileQuery>,
) -> Response {
    responses::respond(state.kernel().get_skill_file(&q.id, &q.path), responses::ok)
}

pub async fn skill_checksum(
    State(state): State<AppState>,
    Query(q): Query<SkillQuery>,
) -> Response {
    responses::respond(state.kernel().get_skill_checksum(&q.id), |checksum| {
        responses::ok(json!({"files_checksum": checksum}))
    })
}

pub async fn skill_file_history(
    State(state): State<AppState>,
    Query(q): Query<SkillQuery>,
) -> Response {
    responses::respond(state.kernel().get_file_history(&q.id), |history| {
        responses::ok(json!({"history": history}))
    })
}

pub async fn skill_analysis_history(
    State(state): State<AppState>,
    Query(q): Query<SkillQuery>,
) -> Response {
    responses::respond(state.kernel().get_analysis_history(&q.id), |history| {
        responses::ok(json!({"history": history}))
    })
}

pub async fn skill_analyzed_models(
    State(state): State<AppState>,
    Query(q): Query<SkillQuery>,
) -> Response {
    responses::respond(state.kernel().get_analyzed_models(&q.id), |models| {
        responses::ok(json!({"models": models}))
    })
}

pub async fn skill_install_command(
    State(state): State<AppState>,
    Query(q): Query<SkillQuery>,
) -> Response {
    responses::respond(state.kernel().get_install_command(&q.id), |command| {
        responses::ok(json!({"command": command}))
    })
}

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default = "default_page_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_page_limit() -> u32 {
    50
}

pub async fn skills_missing_content(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Response {
    let (items, total) = state.kernel().list_skills_missing_content(q.limit, q.offset);
    responses::ok(json!({"items": items, "total": total}))
}

#[derive(Deserialize)]
pub(crate) struct VerifyFileQuery {
    pub id: String,
    pub path: String,
    pub checksum: String,
}

/// Pure query: compare one claimed checksum against the stored file.
pub async fn verify_file(
    State(state): State<AppState>,
    Query(q): Query<VerifyFileQuery>,
) -> Response {
    responses::respond(
        state.kernel().verify_file_checksum(&q.id, &q.path, &q.checksum),
        responses::ok,
    )
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct VerifySkillReq {
    pub skill_id: String,
    /// `(path, checksum)` pairs for the caller's local copy.
    #[schema(value_type = Vec<Vec<String>>)]
    pub files: Vec<(String, String)>,
}

/// Pure query: structured verification report for a local file set.
#[utoipa::path(
    post,
    path = "/verify/skill",
    tag = "Skills",
    request_body = VerifySkillReq,
    responses((status = 200, description = "Verification report", body = serde_json::Value))
)]
pub async fn verify_skill(
    State(state): State<AppState>,
    Json(req): Json<VerifySkillReq>,
) -> Response {
    responses::respond(
        state.kernel().verify_skill_files(&req.skill_id, req.files),
        responses::ok,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::test_support::{bearer, test_state};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use skillgrid_core::checksum::sha256_hex;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_skill() -> Skill {
        serde_json::from_value(serde_json::json!({
            "id": "o/r", "name": "r", "description": "d", "owner": "o", "repo": "r",
            "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z",
            "source": "test"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn add_and_fetch_skill() {
        let (state, _dir, _admin, _worker) = test_state();
        let response = skill_add(
            State(state.clone()),
            bearer("admin-token"),
            Json(sample_skill()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = skill_get(
            State(state.clone()),
            Query(SkillQuery { id: "o/r".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], "o/r");

        // Duplicate insert maps to 409.
        let response = skill_add(State(state), bearer("admin-token"), Json(sample_skill())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn non_admin_cannot_import() {
        let (state, _dir, _admin, _worker) = test_state();
        let response = skill_add(
            State(state),
            bearer("someone-else"),
            Json(sample_skill()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn set_files_then_verify_round_trip() {
        let (state, _dir, _admin, _worker) = test_state();
        skill_add(
            State(state.clone()),
            bearer("admin-token"),
            Json(sample_skill()),
        )
        .await;

        let files = vec![
            SkillFile::from_content("a".into(), "x".into()),
            SkillFile::from_content("b".into(), "y".into()),
        ];
        let response = skill_set_files(
            State(state.clone()),
            bearer("admin-token"),
            Json(SetFilesReq {
                skill_id: "o/r".into(),
                files,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = verify_skill(
            State(state.clone()),
            Json(VerifySkillReq {
                skill_id: "o/r".into(),
                files: vec![
                    ("a".into(), sha256_hex(b"x")),
                    ("b".into(), sha256_hex(b"y")),
                ],
            }),
        )
        .await;
        let report = body_json(response).await;
        assert_eq!(report["is_valid"], true);

        let response = verify_skill(
            State(state),
            Json(VerifySkillReq {
                skill_id: "o/r".into(),
                files: vec![("a".into(), "00".repeat(32)), ("b".into(), sha256_hex(b"y"))],
            }),
        )
        .await;
        let report = body_json(response).await;
        assert_eq!(report["is_valid"], false);
        assert_eq!(report["files_invalid"][0]["path"], "a");
    }
}
