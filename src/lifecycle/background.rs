//! Tracked background tasks.
//!
//! Process-wide background work (mail dispatch, the registry janitor) is
//! spawned through [`Background`] so graceful shutdown can wait for all of
//! it to finish. A panic inside a tracked task is contained and logged; it
//! never takes the process down.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Set of in-flight background tasks.
#[derive(Debug, Default)]
pub struct Background {
    active: AtomicUsize,
    idle: Notify,
}

impl Background {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawn a tracked task. The task is detached; completion (normal or by
    /// panic) decrements the in-flight count.
    pub fn spawn<F>(self: &Arc<Self>, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.active.fetch_add(1, Ordering::AcqRel);

        let tracker = Arc::clone(self);
        let handle = tokio::spawn(task);
        tokio::spawn(async move {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!(task = name, error = %err, "background task panicked");
                }
            }
            if tracker.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                tracker.idle.notify_waiters();
            }
        });
    }

    /// Number of tasks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until every tracked task has completed.
    pub async fn wait(&self) {
        loop {
            // Register interest before the emptiness check to avoid missing
            // a notification between the check and the await.
            let notified = self.idle.notified();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
