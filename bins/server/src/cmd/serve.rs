use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use radar_api::{TrackBroadcaster, TrackStorage};
use radar_api_server::AppState;
use radar_ingest::{IngestPipeline, TrackHistory, TrackHub};
use storage_file::FileStorage;
use storage_memory::MemoryStorage;

use crate::config::{ServeArgs, ServerConfig, StorageConfig};
use crate::error::ServerError;

/// Сколько ждать API сервер после отмены, сверх drain ingest'а.
const API_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn open_storage(config: &StorageConfig) -> Result<Arc<dyn TrackStorage>, ServerError> {
    let storage: Arc<dyn TrackStorage> = match config {
        StorageConfig::Memory(cfg) => {
            tracing::info!(max_records = cfg.max_records, "using memory storage");
            Arc::new(MemoryStorage::from_config(cfg))
        }
        StorageConfig::File(cfg) => {
            let storage = FileStorage::from_config(cfg)
                .map_err(|e| e.with_context(format!("file storage '{}'", cfg.path)))?;
            Arc::new(storage)
        }
    };
    Ok(storage)
}

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("radar-server starting");

    // --- Load config ---
    let config = match &args.config {
        Some(path) => {
            let config = ServerConfig::load(path)?;
            tracing::info!(config = %path, "loaded config");
            config
        }
        None => {
            tracing::info!("no config given, using defaults");
            ServerConfig::default()
        }
    };

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Long-lived handles ---
    let storage = open_storage(&config.storage)?;
    let hub = Arc::new(TrackHub::new());
    let broadcaster: Arc<dyn TrackBroadcaster> = hub.clone();

    let pipeline = Arc::new(IngestPipeline::new(storage.clone(), broadcaster, config.ingest()));
    let history = Arc::new(
        TrackHistory::new(storage.clone())
            .with_limits(config.history_limit, config.history_max_limit)
            .with_timeout(config.persist_timeout()),
    );

    // --- UDP ingest ---
    let socket = UdpSocket::bind(&config.udp_bind)
        .await
        .map_err(|source| ServerError::Bind { addr: config.udp_bind.clone(), source })?;

    let ingest_handle = {
        let pipeline = pipeline.clone();
        let token = token.clone();
        tokio::spawn(async move { pipeline.run(socket, token).await })
    };

    // --- API server (HTTP + WS) ---
    let state = AppState {
        history,
        hub: hub.clone(),
        stats: pipeline.stats(),
        ws_buffer: config.ws_buffer,
        ws_overflow: config.ws_overflow,
    };
    let api_port = config.api_port;
    let api_token = token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = radar_api_server::run(api_port, state, api_token.clone()).await {
            tracing::error!(port = api_port, error = %e, "api server error");
            // API не поднялся: останавливаем и ingest.
            api_token.cancel();
        }
    });

    tracing::info!(udp = %config.udp_bind, api_port, "server ready");

    // --- Ожидание Ctrl+C (или падения API) ---
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = token.cancelled() => {}
    }
    tracing::info!("shutting down...");
    token.cancel();

    // Receive loop сам дожидается worker'ов (drain_timeout).
    if let Err(e) = ingest_handle.await {
        tracing::error!(error = %e, "ingest task failed");
    }

    match tokio::time::timeout(API_SHUTDOWN_GRACE, api_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "api task failed"),
        Err(_) => tracing::warn!("api server did not stop in time"),
    }

    if let Err(e) = storage.flush().await {
        tracing::error!(error = %e, "storage flush error");
    }

    tracing::info!(
        stats = ?pipeline.stats().snapshot(),
        dropped = hub.dropped(),
        "shutdown complete"
    );
    Ok(())
}
