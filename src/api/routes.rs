//! Route Definitions

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms/:room_id", get(room_snapshot_handler))
        .route("/rooms/:room_id/bets", post(place_bet_handler))
        .route("/rooms/:room_id/bets/:card_id", delete(cancel_bet_handler))
        .route("/rooms/:room_id/auto", post(auto_play_handler))
        .route("/rooms/:room_id/countdown", post(countdown_handler))
        .route("/rooms/:room_id/bingo", post(bingo_handler))
        .route("/rooms/:room_id/reset", post(reset_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}
