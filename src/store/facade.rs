//! Typed access to room records across both stores
//!
//! Key layout:
//! - `bingo:room:{room_id}:state`          runtime snapshot
//! - `bingo:room:{room_id}:claims`         claim ledger
//! - `bingo:room:{room_id}:recent_winners` winner cooldown list
//! - `bingo:game:{game_id}`                game record
//! - `bingo:lock:room:{room_id}`           room lock token

use super::traits::{DurableStore, EphemeralStore};
use crate::config::TtlConfig;
use crate::errors::{RoomError, RoomResult, StoreError, StoreResult};
use crate::room::types::{ClaimMap, Game, RoomConfig, RoomRuntimeState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

fn state_key(room_id: &str) -> String {
    format!("bingo:room:{}:state", room_id)
}

fn claims_key(room_id: &str) -> String {
    format!("bingo:room:{}:claims", room_id)
}

fn recent_winners_key(room_id: &str) -> String {
    format!("bingo:room:{}:recent_winners", room_id)
}

fn game_key(game_id: &str) -> String {
    format!("bingo:game:{}", game_id)
}

pub fn lock_key(room_id: &str) -> String {
    format!("bingo:lock:room:{}", room_id)
}

/// Uniform get/set/patch over the durable and ephemeral stores
#[derive(Clone)]
pub struct RoomStore {
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    ttl: TtlConfig,
}

impl RoomStore {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        ttl: TtlConfig,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            ttl,
        }
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    pub fn ephemeral(&self) -> &Arc<dyn EphemeralStore> {
        &self.ephemeral
    }

    /// Fail fast when either backend is unreachable
    pub async fn ping(&self) -> StoreResult<()> {
        self.durable.ping().await?;
        self.ephemeral.ping().await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.ephemeral.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.ephemeral
            .set(key, value, Some(Duration::from_secs(ttl_secs)))
            .await
    }

    pub async fn room_config(&self, room_id: &str) -> RoomResult<RoomConfig> {
        self.durable
            .get_room_config(room_id)
            .await?
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    /// Runtime state, created in `waiting` on first access
    pub async fn runtime(&self, room_id: &str) -> StoreResult<RoomRuntimeState> {
        let key = state_key(room_id);
        match self.get_json(&key).await? {
            Some(state) => Ok(state),
            None => {
                let state = RoomRuntimeState::default();
                self.set_json(&key, &state, self.ttl.room_state_secs).await?;
                Ok(state)
            }
        }
    }

    pub async fn save_runtime(&self, room_id: &str, state: &RoomRuntimeState) -> StoreResult<()> {
        self.set_json(&state_key(room_id), state, self.ttl.room_state_secs)
            .await
    }

    /// Re-read the runtime state, apply `patch`, write it back
    pub async fn patch_runtime<F>(&self, room_id: &str, patch: F) -> StoreResult<RoomRuntimeState>
    where
        F: FnOnce(&mut RoomRuntimeState),
    {
        let mut state = self.runtime(room_id).await?;
        patch(&mut state);
        self.save_runtime(room_id, &state).await?;
        Ok(state)
    }

    pub async fn claims(&self, room_id: &str) -> StoreResult<ClaimMap> {
        Ok(self
            .get_json(&claims_key(room_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_claims(&self, room_id: &str, claims: &ClaimMap) -> StoreResult<()> {
        self.set_json(&claims_key(room_id), claims, self.ttl.claims_secs)
            .await
    }

    pub async fn game(&self, game_id: &str) -> StoreResult<Option<Game>> {
        self.get_json(&game_key(game_id)).await
    }

    pub async fn save_game(&self, game: &Game) -> StoreResult<()> {
        self.set_json(&game_key(&game.game_id), game, self.ttl.game_secs)
            .await
    }

    pub async fn delete_game(&self, game_id: &str) -> StoreResult<bool> {
        self.ephemeral.delete(&game_key(game_id)).await
    }

    pub async fn recent_winners(&self, room_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .get_json(&recent_winners_key(room_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_recent_winners(&self, room_id: &str, winners: &[String]) -> StoreResult<()> {
        self.set_json(
            &recent_winners_key(room_id),
            &winners,
            self.ttl.room_state_secs,
        )
        .await
    }
}
