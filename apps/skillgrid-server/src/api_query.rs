//! Anonymous read views over the index: the filtered catalog, search, the
//! specialty listings, and the aggregate statistics tuples.

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use skillgrid_core::RatingTopic;

use crate::{responses, AppState};

#[derive(Deserialize)]
pub(crate) struct CatalogQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub sort: String,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub category: String,
}

fn default_limit() -> u32 {
    50
}

/// The main catalog view; `total` reflects the filter, not the page.
#[utoipa::path(
    get,
    path = "/state/skills",
    tag = "Query",
    responses(
        (status = 200, description = "Page plus filtered total", body = serde_json::Value),
        (status = 400, description = "Unknown sort key")
    )
)]
pub async fn skills_catalog(
    State(state): State<AppState>,
    Query(q): Query<CatalogQuery>,
) -> Response {
    responses::respond(
        state
            .kernel()
            .list_skills_filtered(q.limit, q.offset, &q.sort, &q.q, &q.category),
        |(skills, total)| responses::ok(json!({"skills": skills, "total": total})),
    )
}

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn skills_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    responses::ok(json!({"results": state.kernel().search_skills(&query.q)}))
}

pub async fn categories(State(state): State<AppState>) -> Response {
    responses::ok(json!({"categories": state.kernel().get_categories()}))
}

#[derive(Deserialize)]
pub(crate) struct CategoryQuery {
    pub category: String,
}

pub async fn skills_by_category(
    State(state): State<AppState>,
    Query(q): Query<CategoryQuery>,
) -> Response {
    responses::ok(json!({"skills": state.kernel().get_skills_by_category(&q.category)}))
}

#[derive(Deserialize)]
pub(crate) struct OwnerQuery {
    pub owner: String,
}

pub async fn skills_by_owner(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> Response {
    responses::ok(json!({"skills": state.kernel().get_skills_by_owner(&q.owner)}))
}

#[derive(Deserialize)]
pub(crate) struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub async fn skills_top_rated(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Response {
    responses::ok(json!({"skills": state.kernel().get_top_rated_skills(q.limit)}))
}

pub async fn skills_providing_mcp(State(state): State<AppState>) -> Response {
    responses::ok(json!({"skills": state.kernel().get_skills_providing_mcp()}))
}

pub async fn skills_flagged(State(state): State<AppState>) -> Response {
    let flagged: Vec<serde_json::Value> = state
        .kernel()
        .get_skills_with_flags()
        .into_iter()
        .map(|(skill, flags)| json!({"skill": skill, "flags": flags}))
        .collect();
    responses::ok(json!({"skills": flagged}))
}

#[derive(Deserialize)]
pub(crate) struct TopicQuery {
    pub topic: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Topic tags come in as strings and are validated against the closed set.
pub async fn skills_by_topic(
    State(state): State<AppState>,
    Query(q): Query<TopicQuery>,
) -> Response {
    let topic = match RatingTopic::parse(&q.topic) {
        Ok(topic) => topic,
        Err(err) => return responses::core_error(err),
    };
    responses::ok(json!({"skills": state.kernel().get_skills_by_topic_rating(topic, q.limit)}))
}

pub async fn skills_unanalyzed(State(state): State<AppState>) -> Response {
    responses::ok(json!({"skills": state.kernel().get_unanalyzed_skills()}))
}

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Every history entry across all skills, newest first.
pub async fn analysis_history_all(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Response {
    let (entries, total) = state.kernel().get_all_analysis_history(q.limit, q.offset);
    let entries: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(skill_id, analysis)| json!({"skill_id": skill_id, "analysis": analysis}))
        .collect();
    responses::ok(json!({"entries": entries, "total": total}))
}

/// Positional u64 tuple: (total, analyzed, installs, users).
pub async fn stats(State(state): State<AppState>) -> Response {
    responses::ok(json!(state.kernel().get_stats()))
}

/// Positional u64 tuple: (history entries, skills with history).
pub async fn analysis_history_stats(State(state): State<AppState>) -> Response {
    responses::ok(json!(state.kernel().get_analysis_history_stats()))
}

/// Positional u64 tuple: (total bytes, content, history, queues).
pub async fn memory_stats(State(state): State<AppState>) -> Response {
    responses::ok(json!(state.kernel().get_memory_stats()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::test_support::test_state;
    use crate::identity;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn seed(state: &AppState) {
        let admin = identity::fingerprint("admin-token");
        for (id, installs) in [("o/alpha", 5u64), ("o/beta", 9)] {
            let mut skill = serde_json::from_value::<skillgrid_core::Skill>(serde_json::json!({
                "id": id, "name": id.split('/').nth(1).unwrap(),
                "description": "d", "owner": "o", "repo": id.split('/').nth(1).unwrap(),
                "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z",
                "source": "test"
            }))
            .unwrap();
            skill.install_count = installs;
            state.kernel().add_skill(&admin, skill).unwrap();
        }
    }

    #[tokio::test]
    async fn catalog_sorts_and_rejects_unknown_keys() {
        let (state, _dir, _admin, _worker) = test_state();
        seed(&state);

        let response = skills_catalog(
            State(state.clone()),
            Query(CatalogQuery {
                limit: 10,
                offset: 0,
                sort: "installs".into(),
                q: String::new(),
                category: String::new(),
            }),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["skills"][0]["id"], "o/beta");

        let response = skills_catalog(
            State(state),
            Query(CatalogQuery {
                limit: 10,
                offset: 0,
                sort: "bogus".into(),
                q: String::new(),
                category: String::new(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_tuples_are_positional() {
        let (state, _dir, _admin, _worker) = test_state();
        seed(&state);
        let response = stats(State(state)).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 4);
        assert_eq!(body[0], 2);
        assert_eq!(body[2], 14);
    }

    #[tokio::test]
    async fn topic_listing_rejects_unknown_topics() {
        let (state, _dir, _admin, _worker) = test_state();
        let response = skills_by_topic(
            State(state.clone()),
            Query(TopicQuery {
                topic: "Security".into(),
                limit: 5,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = skills_by_topic(
            State(state),
            Query(TopicQuery {
                topic: "Vibes".into(),
                limit: 5,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
