//! WebSocket stream of room events
//!
//! Each client gets every `RoomEvent` published on the hub, optionally
//! narrowed to one room with `?roomId=...`.

use super::handlers::AppState;
use crate::events::{BroadcastHub, RoomEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Clone)]
pub struct WebSocketManager {
    hub: BroadcastHub,
    client_count: Arc<AtomicU64>,
}

impl WebSocketManager {
    pub fn new(hub: BroadcastHub) -> Self {
        Self {
            hub,
            client_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn client_count(&self) -> u64 {
        self.client_count.load(Ordering::SeqCst)
    }

    pub fn handle_upgrade(&self, ws: WebSocketUpgrade, room_filter: Option<String>) -> Response {
        let manager = self.clone();
        ws.on_upgrade(move |socket| async move { manager.handle_connection(socket, room_filter).await })
    }

    async fn handle_connection(&self, socket: WebSocket, room_filter: Option<String>) {
        let client_id = generate_client_id();
        let total = self.client_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(client_id = %client_id, room = ?room_filter, total, "websocket client connected");

        let (mut sender, mut receiver) = socket.split();
        let mut rx = self.hub.subscribe();

        let welcome = json!({
            "type": "connected",
            "clientId": client_id,
            "roomId": room_filter,
        });
        if let Err(e) = sender.send(Message::Text(welcome.to_string())).await {
            warn!(client_id = %client_id, error = %e, "failed to greet websocket client");
            self.client_count.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        let recv_id = client_id.clone();
        let mut receive_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Text(text)) => {
                        debug!(client_id = %recv_id, text = %text, "ignoring client message")
                    }
                    Err(e) => {
                        warn!(client_id = %recv_id, error = %e, "websocket receive error");
                        break;
                    }
                    _ => {}
                }
            }
        });

        let send_id = client_id.clone();
        let mut send_task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client_id = %send_id, skipped, "websocket client lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !should_send(&event, room_filter.as_deref()) {
                    continue;
                }

                let message = match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        error!(error = %e, "failed to serialize room event");
                        continue;
                    }
                };
                if sender.send(message).await.is_err() {
                    debug!(client_id = %send_id, "websocket client went away");
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut receive_task => send_task.abort(),
            _ = &mut send_task => receive_task.abort(),
        }

        let remaining = self.client_count.fetch_sub(1, Ordering::SeqCst) - 1;
        info!(client_id = %client_id, remaining, "websocket client disconnected");
    }
}

fn should_send(event: &RoomEvent, room_filter: Option<&str>) -> bool {
    room_filter.map_or(true, |room| event.room_id() == room)
}

fn generate_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    state.websocket_manager.handle_upgrade(ws, params.room_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_filter() {
        let event = RoomEvent::RoomReset {
            room_id: "r1".to_string(),
            retained_cards: vec![],
        };
        assert!(should_send(&event, None));
        assert!(should_send(&event, Some("r1")));
        assert!(!should_send(&event, Some("r2")));
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(generate_client_id(), generate_client_id());
    }
}
