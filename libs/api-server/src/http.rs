use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use radar_ingest::StatsSnapshot;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /tracks?limit=N
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct TracksParams {
    limit: Option<usize>,
}

pub(crate) async fn handle_tracks(
    State(state): State<AppState>,
    Query(params): Query<TracksParams>,
) -> impl IntoResponse {
    match state.history.recent(params.limit).await {
        Ok(records) => axum::Json(records).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "history query failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /stats
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    ingest: StatsSnapshot,
    subscribers: usize,
    dropped: u64,
}

pub(crate) async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(StatsResponse {
        ingest: state.stats.snapshot(),
        subscribers: state.hub.subscriber_count(),
        dropped: state.hub.dropped(),
    })
}
