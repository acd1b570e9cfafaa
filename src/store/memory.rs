//! In-process store implementations
//!
//! Both stores are `DashMap` backed. Ephemeral entries carry an optional
//! deadline that is checked on every read; `purge_expired` sweeps the rest.

use super::traits::{DurableStore, EphemeralStore};
use crate::errors::{StoreError, StoreResult};
use crate::room::types::{RevenueEntry, RoomConfig, UserProfile};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn unavailable(available: &AtomicBool) -> StoreResult<()> {
    if available.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(StoreError::Unavailable("memory store switched off".to_string()))
    }
}

/// Durable store kept in process memory
pub struct MemoryDurableStore {
    rooms: DashMap<String, RoomConfig>,
    users: DashMap<String, UserProfile>,
    revenue: Mutex<Vec<RevenueEntry>>,
    available: AtomicBool,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            users: DashMap::new(),
            revenue: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Insert or replace a user profile
    pub fn upsert_user(&self, profile: UserProfile) {
        self.users.insert(profile.user_id.clone(), profile);
    }

    /// Snapshot of every revenue entry booked so far
    pub fn revenue_entries(&self) -> Vec<RevenueEntry> {
        self.revenue
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Simulate an outage; every call fails while switched off
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn ping(&self) -> StoreResult<()> {
        unavailable(&self.available)
    }

    async fn get_room_config(&self, room_id: &str) -> StoreResult<Option<RoomConfig>> {
        unavailable(&self.available)?;
        Ok(self.rooms.get(room_id).map(|room| room.clone()))
    }

    async fn save_room_config(&self, config: RoomConfig) -> StoreResult<()> {
        unavailable(&self.available)?;
        self.rooms.insert(config.room_id.clone(), config);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        unavailable(&self.available)?;
        Ok(self.users.get(user_id).map(|user| user.clone()))
    }

    async fn get_balance(&self, user_id: &str) -> StoreResult<i64> {
        unavailable(&self.available)?;
        Ok(self.users.get(user_id).map(|user| user.balance).unwrap_or(0))
    }

    async fn adjust_balance(&self, user_id: &str, delta: i64) -> StoreResult<i64> {
        unavailable(&self.available)?;
        // The entry guard holds the shard lock, so the delta is applied atomically.
        let mut user = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id));
        user.balance = user.balance.saturating_add(delta);
        Ok(user.balance)
    }

    async fn increment_games_won(&self, user_id: &str) -> StoreResult<()> {
        unavailable(&self.available)?;
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id))
            .games_won += 1;
        Ok(())
    }

    async fn increment_games_played(&self, user_id: &str) -> StoreResult<()> {
        unavailable(&self.available)?;
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id))
            .games_played += 1;
        Ok(())
    }

    async fn save_revenue_entry(&self, entry: RevenueEntry) -> StoreResult<()> {
        unavailable(&self.available)?;
        let mut revenue = self.revenue.lock().map_err(|e| StoreError::WriteFailed {
            key: format!("revenue:{}", entry.game_id),
            reason: e.to_string(),
        })?;
        revenue.push(entry);
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct EphemeralEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl EphemeralEntry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |deadline| deadline <= now)
    }
}

/// Ephemeral store kept in process memory
pub struct MemoryEphemeralStore {
    entries: DashMap<String, EphemeralEntry>,
    available: AtomicBool,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Drop every expired record; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired records until the store is dropped
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "purged expired ephemeral records");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryEphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralStore for MemoryEphemeralStore {
    async fn ping(&self) -> StoreResult<()> {
        unavailable(&self.available)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        unavailable(&self.available)?;
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        unavailable(&self.available)?;
        self.entries
            .insert(key.to_string(), EphemeralEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        unavailable(&self.available)?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        unavailable(&self.available)?;
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        unavailable(&self.available)?;
        let now = Instant::now();
        let fresh = EphemeralEntry::new(Value::String(token.to_string()), Some(ttl));
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().is_expired(now) {
                    held.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(free) => {
                free.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        unavailable(&self.available)?;
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.value.as_str() == Some(token))
            .is_some())
    }
}
