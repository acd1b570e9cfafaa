//! API Request and Response Models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_tasks: usize,
    pub ws_clients: u64,
}

/// POST /rooms/:room_id/bets
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub card_id: u32,
    pub player_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// DELETE /rooms/:room_id/bets/:card_id?playerId=...
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBetQuery {
    pub player_id: String,
}

/// POST /rooms/:room_id/auto
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPlayRequest {
    pub card_id: u32,
    pub player_id: String,
    pub enabled: bool,
}

/// POST /rooms/:room_id/countdown
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownRequest {
    #[serde(default)]
    pub player_id: Option<String>,
}

/// POST /rooms/:room_id/bingo
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingoRequest {
    pub player_id: String,
    /// Row-major cell indices on the player's card
    pub cells: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub room_id: String,
    pub retained_cards: Vec<u32>,
}
