mod http;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use radar_api::OverflowPolicy;
use radar_ingest::{IngestStats, TrackHistory, TrackHub};

/// Общие для всех handler'ов ручки. Собирается один раз в `serve`.
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<TrackHistory>,
    pub hub: Arc<TrackHub>,
    pub stats: Arc<IngestStats>,
    /// Ёмкость очереди одного WS клиента.
    pub ws_buffer: usize,
    pub ws_overflow: OverflowPolicy,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tracks", get(http::handle_tracks))
        .route("/stats", get(http::handle_stats))
        .route("/ws", get(ws::handle_ws))
        .with_state(state)
}

/// HTTP + WebSocket API. Возвращается после отмены `shutdown`.
pub async fn run(
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "api server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
