//! Store contracts
//!
//! The orchestrator only ever talks to these two traits, so any backend that
//! honours them (in-memory, Redis, SQL) can be plugged in.

use crate::errors::StoreResult;
use crate::room::types::{RevenueEntry, RoomConfig, UserProfile};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Long-lived records: room configuration, balances, player aggregates
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Connectivity check used at start-up
    async fn ping(&self) -> StoreResult<()>;

    async fn get_room_config(&self, room_id: &str) -> StoreResult<Option<RoomConfig>>;

    async fn save_room_config(&self, config: RoomConfig) -> StoreResult<()>;

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;

    /// Current balance; unknown users have a balance of zero
    async fn get_balance(&self, user_id: &str) -> StoreResult<i64>;

    /// Apply a signed delta atomically and return the new balance
    async fn adjust_balance(&self, user_id: &str, delta: i64) -> StoreResult<i64>;

    async fn increment_games_won(&self, user_id: &str) -> StoreResult<()>;

    async fn increment_games_played(&self, user_id: &str) -> StoreResult<()>;

    async fn save_revenue_entry(&self, entry: RevenueEntry) -> StoreResult<()>;
}

/// Short-lived runtime records with store-level expiry
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns true when a record was removed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Reset the expiry of an existing record; false when the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Set `key` to `token` only if it is free or expired
    async fn acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remove `key` only if it still holds `token`
    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool>;
}
