//! skillgrid-server: the RPC surface over the coordination core.
//!
//! One endpoint per kernel operation. Mutating routes resolve the caller
//! from the bearer token; read routes accept anonymous callers. State is
//! snapshotted to the state dir on graceful shutdown.

use axum::{
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use skillgrid_events::{topics, Bus};
use skillgrid_kernel::Kernel;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod api_admin;
mod api_enrich;
mod api_events;
mod api_jobs;
mod api_meta;
mod api_prompts;
mod api_query;
mod api_skills;
mod api_users;
mod app_state;
mod identity;
mod openapi;
mod responses;

pub(crate) use app_state::AppState;

fn router(state: AppState) -> Router {
    Router::new()
        // Meta & events
        .route("/healthz", get(api_meta::healthz))
        .route("/about", get(api_meta::about))
        .route("/events", get(api_events::events_sse))
        .route("/state/events_stats", get(api_events::events_stats))
        .route("/spec/openapi.json", get(openapi::openapi_json))
        // Identity & profile
        .route("/whoami", get(api_users::whoami))
        .route("/me", get(api_users::my_profile))
        .route(
            "/me/credential",
            put(api_users::credential_set)
                .get(api_users::credential_status)
                .delete(api_users::credential_remove),
        )
        // Admin
        .route("/admin/admins", post(api_admin::admin_add))
        .route(
            "/admin/workers",
            post(api_admin::worker_add).get(api_admin::workers_list),
        )
        .route("/admin/workers/remove", post(api_admin::worker_remove))
        .route("/admin/analysis_enabled", post(api_admin::analysis_enabled_set))
        .route("/admin/tee_worker_url", post(api_admin::tee_worker_url_set))
        .route("/tee_worker_url", get(api_admin::tee_worker_url))
        // Skill index (mutations)
        .route("/skills", post(api_skills::skill_add))
        .route("/skills/batch", post(api_skills::skills_add_batch))
        .route("/skills/files", post(api_skills::skill_set_files))
        .route("/skills/file", post(api_skills::skill_add_file))
        .route("/skills/install", post(api_skills::skill_record_install))
        .route("/skills/clear_analysis", post(api_skills::skill_clear_analysis))
        .route(
            "/skills/clear_analysis_history",
            post(api_skills::skill_clear_analysis_history),
        )
        .route("/skills/sync_installs", post(api_skills::skills_sync_installs))
        // Skill index (reads)
        .route("/state/skill", get(api_skills::skill_get))
        .route("/state/skill/files", get(api_skills::skill_files))
        .route("/state/skill/file", get(api_skills::skill_file))
        .route("/state/skill/checksum", get(api_skills::skill_checksum))
        .route("/state/skill/file_history", get(api_skills::skill_file_history))
        .route(
            "/state/skill/analysis_history",
            get(api_skills::skill_analysis_history),
        )
        .route(
            "/state/skill/analyzed_models",
            get(api_skills::skill_analyzed_models),
        )
        .route(
            "/state/skill/install_command",
            get(api_skills::skill_install_command),
        )
        .route(
            "/state/skills/missing_content",
            get(api_skills::skills_missing_content),
        )
        // Verification (pure queries)
        .route("/verify/file", get(api_skills::verify_file))
        .route("/verify/skill", post(api_skills::verify_skill))
        // Catalog & search
        .route("/state/skills", get(api_query::skills_catalog))
        .route("/state/skills/search", get(api_query::skills_search))
        .route("/state/skills/categories", get(api_query::categories))
        .route("/state/skills/by_category", get(api_query::skills_by_category))
        .route("/state/skills/by_owner", get(api_query::skills_by_owner))
        .route("/state/skills/top_rated", get(api_query::skills_top_rated))
        .route(
            "/state/skills/providing_mcp",
            get(api_query::skills_providing_mcp),
        )
        .route("/state/skills/flagged", get(api_query::skills_flagged))
        .route("/state/skills/by_topic", get(api_query::skills_by_topic))
        .route("/state/skills/unanalyzed", get(api_query::skills_unanalyzed))
        .route("/state/analysis_history", get(api_query::analysis_history_all))
        .route("/state/stats", get(api_query::stats))
        .route(
            "/state/analysis_history_stats",
            get(api_query::analysis_history_stats),
        )
        .route("/state/memory_stats", get(api_query::memory_stats))
        // Analysis queue
        .route("/jobs/analysis", post(api_jobs::analysis_request))
        .route("/jobs/analysis/claim", post(api_jobs::analysis_claim))
        .route("/jobs/analysis/result", post(api_jobs::analysis_result))
        .route("/jobs/analysis/result_meta", post(api_jobs::analysis_result_meta))
        .route("/jobs/analysis/error", post(api_jobs::analysis_error))
        .route("/jobs/analysis/cancel", post(api_jobs::analysis_cancel))
        .route("/state/job", get(api_jobs::job_status))
        .route("/state/jobs", get(api_jobs::jobs_list))
        .route("/state/jobs/pending_count", get(api_jobs::jobs_pending_count))
        // Enrichment queue
        .route("/jobs/enrichment", post(api_enrich::enrichment_request))
        .route("/jobs/enrichment/batch", post(api_enrich::enrichment_batch))
        .route("/jobs/enrichment/claim", post(api_enrich::enrichment_claim))
        .route("/jobs/enrichment/result", post(api_enrich::enrichment_result))
        .route("/jobs/enrichment/error", post(api_enrich::enrichment_error))
        .route("/jobs/enrichment/cancel", post(api_enrich::enrichment_cancel))
        .route("/state/enrichment", get(api_enrich::enrichment_status))
        .route(
            "/state/enrichment/pending_count",
            get(api_enrich::enrichment_pending_count),
        )
        // Prompt registry
        .route(
            "/prompts",
            post(api_prompts::prompt_create).get(api_prompts::prompts_list),
        )
        .route("/prompts/default", get(api_prompts::prompt_default))
        .route("/prompts/set_default", post(api_prompts::prompt_set_default))
        .route(
            "/prompts/:id",
            get(api_prompts::prompt_get).delete(api_prompts::prompt_delete),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to install ctrl-c handler");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state_dir =
        std::env::var("SKILLGRID_STATE_DIR").unwrap_or_else(|_| "state".to_string());
    let kernel = Kernel::open(std::path::Path::new(&state_dir))?;
    match identity::bootstrap_admin_from_env() {
        Some(admin) => kernel.ensure_admin(&admin),
        None => warn!("SKILLGRID_ADMIN_TOKEN not set; no bootstrap admin registered"),
    }

    let bus = Bus::new_with_replay(256, 256);
    let state = AppState::new(bus.clone(), kernel.clone());
    let app = router(state).layer(TraceLayer::new_for_http());

    let bind = std::env::var("SKILLGRID_BIND").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    bus.publish(topics::TOPIC_SERVICE_START, &json!({"bind": bind}));
    info!(%bind, %state_dir, "skillgrid server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.publish(topics::TOPIC_SERVICE_SHUTDOWN, &json!({}));
    kernel.save()?;
    info!("state snapshot written; goodbye");
    Ok(())
}
