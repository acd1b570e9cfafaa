//! Realtime room notifications
//!
//! Delivery is fire-and-forget: the orchestrator publishes and moves on,
//! whether or not anyone is listening.

use crate::room::types::EndReason;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    CardClaimed {
        room_id: String,
        card_id: u32,
        player_id: String,
        username: String,
        population: usize,
    },
    CardUnclaimed {
        room_id: String,
        card_id: u32,
        player_id: String,
        population: usize,
    },
    CountdownStarted {
        room_id: String,
        ends_at: i64,
        started_by: Option<String>,
    },
    CountdownStopped {
        room_id: String,
        reason: String,
    },
    GameStarted {
        room_id: String,
        game_id: String,
        players: usize,
        pot: i64,
    },
    NumberDrawn {
        room_id: String,
        game_id: String,
        number: u8,
        index: usize,
    },
    WinnerConfirmed {
        room_id: String,
        game_id: String,
        player_id: String,
        username: String,
        card_id: u32,
        pattern_index: usize,
        payout: i64,
    },
    GameEnded {
        room_id: String,
        game_id: String,
        reason: EndReason,
        winners: Vec<String>,
        payout: i64,
    },
    RoomReset {
        room_id: String,
        retained_cards: Vec<u32>,
    },
    CardAutoUpdated {
        room_id: String,
        card_id: u32,
        player_id: String,
        auto: bool,
        auto_until: Option<i64>,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &str {
        match self {
            RoomEvent::CardClaimed { room_id, .. }
            | RoomEvent::CardUnclaimed { room_id, .. }
            | RoomEvent::CountdownStarted { room_id, .. }
            | RoomEvent::CountdownStopped { room_id, .. }
            | RoomEvent::GameStarted { room_id, .. }
            | RoomEvent::NumberDrawn { room_id, .. }
            | RoomEvent::WinnerConfirmed { room_id, .. }
            | RoomEvent::GameEnded { room_id, .. }
            | RoomEvent::RoomReset { room_id, .. }
            | RoomEvent::CardAutoUpdated { room_id, .. } => room_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::CardClaimed { .. } => "cardClaimed",
            RoomEvent::CardUnclaimed { .. } => "cardUnclaimed",
            RoomEvent::CountdownStarted { .. } => "countdownStarted",
            RoomEvent::CountdownStopped { .. } => "countdownStopped",
            RoomEvent::GameStarted { .. } => "gameStarted",
            RoomEvent::NumberDrawn { .. } => "numberDrawn",
            RoomEvent::WinnerConfirmed { .. } => "winnerConfirmed",
            RoomEvent::GameEnded { .. } => "gameEnded",
            RoomEvent::RoomReset { .. } => "roomReset",
            RoomEvent::CardAutoUpdated { .. } => "cardAutoUpdated",
        }
    }
}

/// Outbound notification channel
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RoomEvent);
}

/// In-process fan-out over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<RoomEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: RoomEvent) {
        let name = event.name();
        if let Err(e) = self.tx.send(event) {
            debug!(event = name, "no subscribers for room event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = RoomEvent::NumberDrawn {
            room_id: "r1".to_string(),
            game_id: "g1".to_string(),
            number: 42,
            index: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "numberDrawn");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["gameId"], "g1");
        assert_eq!(json["number"], 42);
        assert_eq!(event.name(), "numberDrawn");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let hub = BroadcastHub::new(4);
        hub.publish(RoomEvent::RoomReset {
            room_id: "r1".to_string(),
            retained_cards: vec![],
        });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let hub = BroadcastHub::new(4);
        let mut rx = hub.subscribe();
        hub.publish(RoomEvent::CountdownStopped {
            room_id: "r1".to_string(),
            reason: "not enough players".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.room_id(), "r1");
        assert_eq!(event.name(), "countdownStopped");
    }
}
