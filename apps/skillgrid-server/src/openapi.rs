//! Generated OpenAPI document for the annotated surfaces, served at
//! `/spec/openapi.json`.

use axum::response::Response;
use utoipa::OpenApi;

use crate::responses;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "skillgrid",
        description = "Coordination core for the skillgrid skill-analysis platform"
    ),
    paths(
        crate::api_jobs::analysis_request,
        crate::api_jobs::analysis_claim,
        crate::api_jobs::analysis_result,
        crate::api_jobs::analysis_result_meta,
        crate::api_jobs::analysis_error,
        crate::api_jobs::analysis_cancel,
        crate::api_enrich::enrichment_request,
        crate::api_enrich::enrichment_batch,
        crate::api_enrich::enrichment_result,
        crate::api_skills::skill_add,
        crate::api_skills::skills_add_batch,
        crate::api_skills::skill_set_files,
        crate::api_skills::verify_skill,
        crate::api_users::credential_set,
        crate::api_admin::worker_add,
        crate::api_prompts::prompt_create,
        crate::api_query::skills_catalog,
    ),
    components(schemas(
        skillgrid_core::Skill,
        skillgrid_core::SkillFile,
        skillgrid_core::SkillFileType,
        skillgrid_core::SkillFileVersion,
        skillgrid_core::SkillAnalysis,
        skillgrid_core::Ratings,
        skillgrid_core::TopicRating,
        skillgrid_core::RatingTopic,
        skillgrid_core::RatingFlag,
        skillgrid_core::FlagType,
        skillgrid_core::FlagSeverity,
        skillgrid_core::McpDependency,
        skillgrid_core::SoftwareDependency,
        skillgrid_core::ReferencedFile,
        skillgrid_core::ReferencedUrl,
        skillgrid_core::Identity,
        skillgrid_core::EnrichmentResult,
        skillgrid_core::EnrichmentFile,
        crate::api_jobs::AnalysisReq,
        crate::api_jobs::ClaimReq,
        crate::api_jobs::ResultReq,
        crate::api_jobs::ResultMetaReq,
        crate::api_jobs::JobErrorReq,
        crate::api_jobs::CancelReq,
        crate::api_enrich::EnrichmentReq,
        crate::api_enrich::EnrichmentBatchReq,
        crate::api_enrich::EnrichmentResultReq,
        crate::api_skills::SetFilesReq,
        crate::api_skills::VerifySkillReq,
        crate::api_users::CredentialReq,
        crate::api_admin::IdentityReq,
        crate::api_prompts::CreatePromptReq,
    ))
)]
pub(crate) struct ApiDoc;

pub async fn openapi_json() -> Response {
    responses::ok(ApiDoc::openapi())
}
