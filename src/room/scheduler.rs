//! Registry of per-room background tasks
//!
//! Every countdown ticker, draw ticker and delayed reset is a tokio task owned
//! here, keyed by `(room_id, kind)`. Starting a task of a kind replaces (and
//! aborts) the previous one; cancelling is idempotent.

use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Countdown,
    Draw,
    Reset,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Countdown => write!(f, "countdown"),
            TaskKind::Draw => write!(f, "draw"),
            TaskKind::Reset => write!(f, "reset"),
        }
    }
}

struct TaskEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Handle a running task uses to deregister itself on exit
#[derive(Debug, Clone)]
pub struct TaskTicket {
    pub room_id: String,
    pub kind: TaskKind,
    pub generation: u64,
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<(String, TaskKind), TaskEntry>,
    generations: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `make(ticket)` as the room's task of `kind`, aborting any predecessor
    pub fn spawn<F, Fut>(&self, room_id: &str, kind: TaskKind, make: F)
    where
        F: FnOnce(TaskTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = TaskTicket {
            room_id: room_id.to_string(),
            kind,
            generation,
        };
        let handle = tokio::spawn(make(ticket));
        if let Some(previous) = self
            .tasks
            .insert((room_id.to_string(), kind), TaskEntry { generation, handle })
        {
            previous.handle.abort();
        }
        debug!(room_id, %kind, generation, "room task started");
    }

    /// Abort the task without waiting for it; true when one was registered
    pub fn cancel(&self, room_id: &str, kind: TaskKind) -> bool {
        match self.tasks.remove(&(room_id.to_string(), kind)) {
            Some((_, entry)) => {
                entry.handle.abort();
                debug!(room_id, %kind, "room task cancelled");
                true
            }
            None => false,
        }
    }

    /// Abort the task and wait until it has actually stopped.
    ///
    /// Must not be called from inside the task being stopped.
    pub async fn stop(&self, room_id: &str, kind: TaskKind) -> bool {
        match self.tasks.remove(&(room_id.to_string(), kind)) {
            Some((_, entry)) => {
                entry.handle.abort();
                let _ = entry.handle.await;
                debug!(room_id, %kind, "room task stopped");
                true
            }
            None => false,
        }
    }

    /// Deregister a task that is finishing on its own
    pub fn finish(&self, ticket: &TaskTicket) {
        self.tasks.remove_if(&(ticket.room_id.clone(), ticket.kind), |_, entry| {
            entry.generation == ticket.generation
        });
    }

    pub fn is_running(&self, room_id: &str, kind: TaskKind) -> bool {
        self.tasks
            .get(&(room_id.to_string(), kind))
            .map_or(false, |entry| !entry.handle.is_finished())
    }

    /// Cancel every task of a room
    pub fn cancel_room(&self, room_id: &str) {
        for kind in [TaskKind::Countdown, TaskKind::Draw, TaskKind::Reset] {
            self.cancel(room_id, kind);
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let registry = TaskRegistry::new();
        registry.spawn("r1", TaskKind::Draw, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert!(registry.is_running("r1", TaskKind::Draw));
        assert!(registry.cancel("r1", TaskKind::Draw));
        assert!(!registry.cancel("r1", TaskKind::Draw));
        assert!(!registry.is_running("r1", TaskKind::Draw));
    }

    #[tokio::test]
    async fn test_respawn_aborts_previous() {
        let registry = TaskRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            registry.spawn("r1", TaskKind::Reset, move |_| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_finish_keeps_newer_task() {
        let registry = Arc::new(TaskRegistry::new());
        let (tx, rx) = tokio::sync::oneshot::channel();
        registry.spawn("r1", TaskKind::Countdown, move |ticket| async move {
            let _ = tx.send(ticket);
        });
        let first = rx.await.unwrap();

        registry.spawn("r1", TaskKind::Countdown, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.finish(&first);

        assert!(registry.is_running("r1", TaskKind::Countdown));
        registry.cancel_room("r1");
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_waits_for_task() {
        let registry = TaskRegistry::new();
        registry.spawn("r1", TaskKind::Draw, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert!(registry.stop("r1", TaskKind::Draw).await);
        assert!(!registry.stop("r1", TaskKind::Draw).await);
    }
}
