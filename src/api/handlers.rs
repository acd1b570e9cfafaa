//! Request Handlers
//!
//! Thin adapters from HTTP to `RoomOrchestrator`. Success bodies use the
//! `{success, data}` envelope; failures go through `ApiError`.

use super::{errors::ApiError, middleware::RequestId, models::*, websocket::WebSocketManager};
use crate::errors::{Envelope, RoomResult};
use crate::room::{
    AutoPlayStatus, BetReceipt, BingoOutcome, CountdownInfo, PlayerRef, RoomOrchestrator,
    RoomSnapshot,
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::debug;

/// Shared application state
pub struct AppState {
    pub orchestrator: RoomOrchestrator,
    pub websocket_manager: Arc<WebSocketManager>,
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn respond<T>(request_id: RequestId, result: RoomResult<T>) -> ApiResult<T> {
    result
        .map(|data| Json(Envelope::ok(data)))
        .map_err(|e| ApiError::room(request_id.0, e))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        active_tasks: state.orchestrator.registry().active_count(),
        ws_clients: state.websocket_manager.client_count(),
    })
}

/// GET /rooms/:room_id
pub async fn room_snapshot_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<RoomSnapshot> {
    respond(request_id, state.orchestrator.room_snapshot(&room_id).await)
}

/// POST /rooms/:room_id/bets
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(body): Json<PlaceBetRequest>,
) -> ApiResult<BetReceipt> {
    let username = body.username.unwrap_or_else(|| body.player_id.clone());
    let player = PlayerRef::new(body.player_id, username);
    debug!(request_id = %request_id.0, room_id = %room_id, card_id = body.card_id, "place bet");
    respond(
        request_id,
        state.orchestrator.place_bet(&room_id, body.card_id, &player).await,
    )
}

/// DELETE /rooms/:room_id/bets/:card_id?playerId=...
pub async fn cancel_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path((room_id, card_id)): Path<(String, u32)>,
    Query(query): Query<CancelBetQuery>,
) -> ApiResult<BetReceipt> {
    respond(
        request_id,
        state
            .orchestrator
            .cancel_bet(&room_id, card_id, &query.player_id)
            .await,
    )
}

/// POST /rooms/:room_id/auto
pub async fn auto_play_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(body): Json<AutoPlayRequest>,
) -> ApiResult<AutoPlayStatus> {
    respond(
        request_id,
        state
            .orchestrator
            .toggle_auto_play(&room_id, body.card_id, &body.player_id, body.enabled)
            .await,
    )
}

/// POST /rooms/:room_id/countdown
pub async fn countdown_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Option<Json<CountdownRequest>>,
) -> ApiResult<CountdownInfo> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    respond(
        request_id,
        state
            .orchestrator
            .start_countdown(&room_id, body.player_id.as_deref())
            .await,
    )
}

/// POST /rooms/:room_id/bingo
pub async fn bingo_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(body): Json<BingoRequest>,
) -> ApiResult<BingoOutcome> {
    if body.cells.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0,
            "cells must not be empty".to_string(),
        ));
    }
    respond(
        request_id,
        state
            .orchestrator
            .check_bingo(&room_id, &body.player_id, &body.cells)
            .await,
    )
}

/// POST /rooms/:room_id/reset
pub async fn reset_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<ResetResponse> {
    let result = state
        .orchestrator
        .reset_room(&room_id)
        .await
        .map(|retained_cards| ResetResponse {
            room_id: room_id.clone(),
            retained_cards,
        });
    respond(request_id, result)
}
