//! SSE tail of the in-process bus. Pull-only observability; the core never
//! pushes anywhere else.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::{responses, AppState};

/// `GET /events?replay=N&prefix=skill.jobs.`: recent envelopes first,
/// then the live feed, optionally filtered by kind prefix.
pub async fn events_sse(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let replay_n = q
        .get("replay")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);
    let prefix = q.get("prefix").cloned();

    let backlog = if replay_n > 0 {
        state.bus().replay(replay_n)
    } else {
        Vec::new()
    };
    let rx = match &prefix {
        Some(p) => state.bus().subscribe_filtered(vec![p.clone()], None),
        None => state.bus().subscribe(),
    };

    let backlog_prefix = prefix.clone();
    let backlog = backlog
        .into_iter()
        .filter(move |env| {
            backlog_prefix
                .as_ref()
                .map_or(true, |p| env.kind.starts_with(p.as_str()))
        });
    let live = BroadcastStream::new(rx).filter_map(|item| item.ok());
    let stream = tokio_stream::iter(backlog).chain(live).map(|env| {
        Ok::<_, Infallible>(
            SseEvent::default()
                .event(env.kind.clone())
                .data(env.payload.to_string()),
        )
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Publish/delivery counters for operators.
pub async fn events_stats(State(state): State<AppState>) -> Response {
    responses::ok(json!(state.bus().stats()))
}
