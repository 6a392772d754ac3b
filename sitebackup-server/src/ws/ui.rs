use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sitebackup_engine::EngineEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

const BROADCAST_CAPACITY: usize = 256;
const MAX_QUEUE_PER_STREAM: usize = 100;

/// Replay stream shared by all log lines.
const LOG_STREAM: &str = "log";

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct UiBroadcaster {
    tx: broadcast::Sender<String>,
    queue: Arc<DashMap<String, VecDeque<QueuedMessage>>>,
}

impl UiBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            queue: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn broadcast(&self, event_type: &str, payload: Value) {
        let msg = serde_json::json!({
            "type": event_type,
            "payload": payload,
        });

        if let Some(stream) = replay_stream(event_type, &payload) {
            let mut entry = self.queue.entry(stream).or_default();
            entry.push_back(QueuedMessage {
                event_type: event_type.to_string(),
                payload,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
            if entry.len() > MAX_QUEUE_PER_STREAM {
                entry.pop_front();
            }
        }

        let _ = self.tx.send(msg.to_string());
    }

    pub fn get_queued_messages(&self, stream: &str, since: i64) -> Vec<QueuedMessage> {
        self.queue
            .get(stream)
            .map(|q| q.iter().filter(|m| m.timestamp > since).cloned().collect())
            .unwrap_or_default()
    }

    /// Relay engine events to every connected viewer until `cancel` fires.
    pub fn forward_engine_events(&self, mut events: broadcast::Receiver<EngineEvent>, cancel: CancellationToken) {
        let ui = self.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => ui.relay(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "UI relay lagged behind engine events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn relay(&self, event: &EngineEvent) {
        let Ok(mut value) = serde_json::to_value(event) else {
            return;
        };
        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let payload = value.get_mut("payload").map(Value::take).unwrap_or(Value::Null);
        self.broadcast(&event_type, payload);
    }
}

/// Job state replays per method; log lines replay as one stream.
fn replay_stream(event_type: &str, payload: &Value) -> Option<String> {
    match event_type {
        "job:state" => payload.get("method").and_then(|m| m.as_str()).map(str::to_string),
        "log:append" => Some(LOG_STREAM.to_string()),
        _ => None,
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ui_socket(socket, state))
}

async fn handle_ui_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ui.subscribe();
    let (replay_tx, mut replay_rx) = mpsc::unbounded_channel::<String>();

    // Forward broadcasts and this client's replays
    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(msg) = replay_rx.recv() => msg,
            };
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages from client (e.g., replay:request)
    let ui = state.ui.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(parsed) = serde_json::from_str::<Value>(&text) else { continue };
            if parsed.get("type").and_then(|t| t.as_str()) != Some("replay:request") {
                continue;
            }
            let Some(payload) = parsed.get("payload") else { continue };
            let stream = payload
                .get("method")
                .and_then(|v| v.as_str())
                .unwrap_or(LOG_STREAM);
            let since = payload.get("since").and_then(|v| v.as_i64()).unwrap_or(0);

            for m in ui.get_queued_messages(stream, since) {
                let replay = serde_json::json!({
                    "type": m.event_type,
                    "payload": m.payload,
                });
                if replay_tx.send(replay.to_string()).is_err() {
                    return;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}
