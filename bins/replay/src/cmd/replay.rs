use std::net::SocketAddr;

use chrono::Utc;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use radar_api::format_instant;

use super::config::ReplayArgs;
use super::error::ReplayError;
use super::schedule::{self, Entry};

const PROGRESS_EVERY: u64 = 1000;

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(args: &ReplayArgs) -> Result<(), ReplayError> {
    let records = load(&args.file)?;
    tracing::info!(file = %args.file, records = records.len(), "loaded");

    let pacing = args.pacing();
    let (entries, skipped) = schedule::build(records, &pacing);
    if skipped.not_object > 0 || skipped.no_time > 0 {
        tracing::warn!(not_object = skipped.not_object, no_time = skipped.no_time, "records skipped");
    }
    if entries.is_empty() {
        return Err(ReplayError::Config(format!("{}: nothing to send", args.file)));
    }

    tracing::info!(pacing = ?pacing, "schedule built");
    stream(&entries, &args.target, args.repeat).await
}

/// Проиграть готовое расписание `repeat` раз в `target`.
pub async fn stream(entries: &[Entry], target: &str, repeat: u32) -> Result<(), ReplayError> {
    let addr: SocketAddr = tokio::net::lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| ReplayError::Config(format!("cannot resolve {target}")))?;
    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await?;

    tracing::info!(target = %addr, packets = entries.len(), repeat, "starting stream");

    let started = Instant::now();
    let mut sent = 0u64;
    for round in 0..repeat {
        sent += send_round(&socket, addr, entries, sent).await?;
        tracing::debug!(round, sent, "round finished");
    }

    tracing::info!(sent, elapsed = ?started.elapsed(), "stream finished");
    Ok(())
}

pub(super) fn load(path: &str) -> Result<Vec<Value>, ReplayError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ReplayError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Один проход по файлу. Время отсчитывается от начала прохода,
/// так что задержка отправки не накапливается.
async fn send_round(
    socket: &UdpSocket,
    target: SocketAddr,
    entries: &[Entry],
    already_sent: u64,
) -> Result<u64, ReplayError> {
    let anchor = Instant::now();
    let mut sent = 0u64;

    for entry in entries {
        tokio::time::sleep_until(anchor + entry.offset).await;

        let mut record = entry.record.clone();
        record.insert("ts_sent".into(), Value::String(format_instant(&Utc::now())));
        let payload = serde_json::to_vec(&record).map_err(ReplayError::Encode)?;

        if let Err(e) = socket.send_to(&payload, target).await {
            tracing::warn!(%target, len = payload.len(), error = %e, "send failed");
            continue;
        }

        sent += 1;
        let total = already_sent + sent;
        if total % PROGRESS_EVERY == 0 {
            let last = record.get("track_id").and_then(Value::as_str).unwrap_or("?");
            tracing::info!(sent = total, last_track = last, "progress");
        }
    }
    Ok(sent)
}
