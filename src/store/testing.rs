//! Store doubles for failure-path tests
//!
//! `FaultyEphemeralStore` wraps the in-memory store and fails calls on keys
//! containing an armed pattern.

use super::memory::MemoryEphemeralStore;
use super::traits::EphemeralStore;
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Fault {
    pattern: String,
    reads: bool,
}

#[derive(Default)]
pub struct FaultyEphemeralStore {
    inner: MemoryEphemeralStore,
    fault: Mutex<Option<Fault>>,
}

impl FaultyEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail reads and writes on keys containing `pattern`
    pub fn fail_keys(&self, pattern: &str) {
        self.arm(pattern, true);
    }

    /// Fail only writes on keys containing `pattern`
    pub fn fail_writes(&self, pattern: &str) {
        self.arm(pattern, false);
    }

    pub fn heal(&self) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = None;
        }
    }

    fn arm(&self, pattern: &str, reads: bool) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some(Fault {
                pattern: pattern.to_string(),
                reads,
            });
        }
    }

    fn check(&self, key: &str, write: bool) -> StoreResult<()> {
        let fault = self.fault.lock().ok().and_then(|f| f.clone());
        match fault {
            Some(f) if key.contains(&f.pattern) && (write || f.reads) => {
                Err(StoreError::Unavailable(format!("injected fault on {}", key)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EphemeralStore for FaultyEphemeralStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check(key, false)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        self.check(key, true)?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check(key, true)?;
        self.inner.delete(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check(key, true)?;
        self.inner.expire(key, ttl).await
    }

    async fn acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        self.check(key, true)?;
        self.inner.acquire_lock(key, token, ttl).await
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.check(key, true)?;
        self.inner.release_lock(key, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_fault_leaves_reads_alone() {
        let store = FaultyEphemeralStore::new();
        store.set("bingo:game:g1", json!(1), None).await.unwrap();
        store.fail_writes("bingo:game:");

        assert!(store.set("bingo:game:g1", json!(2), None).await.is_err());
        assert_eq!(store.get("bingo:game:g1").await.unwrap(), Some(json!(1)));
        assert!(store.set("bingo:room:r1:state", json!(3), None).await.is_ok());

        store.heal();
        assert!(store.set("bingo:game:g1", json!(2), None).await.is_ok());
    }
}
