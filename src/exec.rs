//! Named task-spawning helpers for the handler's background work.
//!
//! The handler owns two execution contexts: one long-running listener task
//! and one pool for release actions. Both are thin wrappers over tokio
//! spawning that add a name (carried on a tracing span, so log lines from
//! the listener and from release actions are attributable) and, for the
//! pool, handle tracking so shutdown can await everything that was
//! submitted. Submitted work is never cancelled — a release action runs to
//! completion once it has started.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

/// Spawns a named task expected to live until shutdown.
pub fn spawn_long_running(
    name: &'static str,
    future: impl Future<Output = ()> + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(future.instrument(tracing::debug_span!("task", name)))
}

/// A named, unbounded pool of short-lived tasks.
///
/// Submission never blocks; [`TaskPool::stop`] awaits every task submitted so
/// far. Release actions are assumed fast relative to contention frequency, so
/// no bound is enforced on in-flight submissions.
pub struct TaskPool {
    name: &'static str,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskPool {
    /// Creates an empty pool.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Submits a task; it starts running immediately.
    pub fn submit(&self, future: impl Future<Output = ()> + Send + 'static) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(future.instrument(tracing::debug_span!("task", name = self.name)));
    }

    /// Awaits every submitted task. Panicking tasks are logged, not
    /// propagated; stop is best-effort cleanup.
    pub async fn stop(&self) {
        let mut tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                if err.is_panic() {
                    tracing::warn!("task in pool {} panicked: {err}", self.name);
                }
            }
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool").field("name", &self.name).finish_non_exhaustive()
    }
}
