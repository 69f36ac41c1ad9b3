use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use radar_api::{StoredId, TrackEvent};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws?history=N
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct WsParams {
    history: Option<usize>,
}

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(socket, state, params.history))
}

// ═══════════════════════════════════════════════════════════════
//  Protocol types
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct WsAction {
    action: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct WsRecords {
    r#type: &'static str,
    records: Vec<TrackEvent>,
}

#[derive(Serialize)]
struct WsRecord<'a> {
    r#type: &'static str,
    record: &'a TrackEvent,
}

// ═══════════════════════════════════════════════════════════════
//  Connection handler
// ═══════════════════════════════════════════════════════════════

async fn ws_connection(mut socket: WebSocket, state: AppState, history: Option<usize>) {
    // Подписка раньше snapshot'а: всё, что сохранится пока читаем
    // историю, придёт live. Дубликаты отсекаются по `_id`.
    let mut sub = state.hub.subscribe(state.ws_buffer, state.ws_overflow);
    let mut seen: Option<StoredId> = None;

    if let Some(limit) = history {
        match state.history.recent(Some(limit)).await {
            Ok(mut records) => {
                seen = records.first().and_then(|r| r.id);
                records.reverse();
                if send_json(&mut socket, &WsRecords { r#type: "snapshot", records }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                if send_error(&mut socket, format!("history: {e}")).await.is_err() {
                    return;
                }
            }
        }
    }

    tracing::debug!(subscribers = state.hub.subscriber_count(), "ws client connected");

    loop {
        tokio::select! {
            biased;

            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let sent = match serde_json::from_str::<WsAction>(&text) {
                    Ok(action) => handle_action(&state, &mut socket, action).await,
                    Err(e) => send_error(&mut socket, format!("parse: {e}")).await,
                };
                if sent.is_err() {
                    break;
                }
            }

            record = sub.recv() => {
                let Some(record) = record else { break };
                if let (Some(seen), Some(id)) = (seen, record.id) {
                    if id <= seen {
                        continue;
                    }
                }

                let msg = WsRecord { r#type: "new_track", record: &record };
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("ws client disconnected");
}

async fn handle_action(
    state: &AppState,
    socket: &mut WebSocket,
    action: WsAction,
) -> Result<(), axum::Error> {
    match action.action.as_str() {
        "recent" => match state.history.recent(action.limit).await {
            Ok(records) => send_json(socket, &WsRecords { r#type: "recent", records }).await,
            Err(e) => send_error(socket, format!("recent: {e}")).await,
        },
        other => send_error(socket, format!("unknown action: {other}")).await,
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "ws message serialization failed");
            Ok(())
        }
    }
}

async fn send_error(socket: &mut WebSocket, error: String) -> Result<(), axum::Error> {
    send_json(socket, &serde_json::json!({ "error": error })).await
}
