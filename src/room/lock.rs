//! Per-room mutual exclusion on top of the ephemeral store
//!
//! Acquisition is a conditional set-with-expiry retried with a short backoff
//! until `lock_wait_ms` runs out. The stored token makes release owner-checked,
//! so an expired holder can never free a lock someone else has since taken.

use crate::config::TimingConfig;
use crate::errors::{RoomError, RoomResult};
use crate::store::facade::lock_key;
use crate::store::EphemeralStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RoomLock {
    store: Arc<dyn EphemeralStore>,
    wait: Duration,
    ttl: Duration,
    retry: Duration,
}

impl RoomLock {
    pub fn new(store: Arc<dyn EphemeralStore>, timing: &TimingConfig) -> Self {
        Self {
            store,
            wait: Duration::from_millis(timing.lock_wait_ms),
            ttl: Duration::from_millis(timing.lock_ttl_ms),
            retry: Duration::from_millis(timing.lock_retry_ms),
        }
    }

    /// Take the room lock, failing with `LockTimeout` once the wait bound passes
    pub async fn acquire(&self, room_id: &str) -> RoomResult<LockGuard> {
        let key = lock_key(room_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;
        let max_backoff = self.retry * 8;
        let mut backoff = self.retry;

        loop {
            if self.store.acquire_lock(&key, &token, self.ttl).await? {
                debug!(room_id, "room lock acquired");
                return Ok(LockGuard {
                    store: self.store.clone(),
                    key,
                    token,
                    released: false,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(room_id, wait_ms = self.wait.as_millis() as u64, "room lock wait exceeded");
                return Err(RoomError::LockTimeout);
            }

            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }
}

/// A held room lock. Call `release`; dropping it releases in the background.
pub struct LockGuard {
    store: Arc<dyn EphemeralStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub async fn release(mut self) {
        self.released = true;
        match self.store.release_lock(&self.key, &self.token).await {
            Ok(true) => debug!(key = %self.key, "room lock released"),
            Ok(false) => warn!(key = %self.key, "room lock expired before release"),
            Err(e) => warn!(key = %self.key, error = %e, "room lock release failed"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Reached when the holding task is aborted mid-operation.
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.release_lock(&key, &token).await {
                    warn!(key = %key, error = %e, "background room lock release failed");
                }
            });
        }
    }
}
