//! Cancellable handle for background tasks.

use tokio::task::JoinHandle;

/// Owns a spawned task and stops it on cancel or drop.
///
/// Sensor subscriptions are held as `TaskGuard`s: the poll loop lives exactly
/// as long as the guard does.
#[derive(Debug)]
pub struct TaskGuard {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    /// Wraps a spawned task.
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle: Some(handle),
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until the task has actually stopped running.
    ///
    /// A cancelled task stays active until the runtime has processed the
    /// abort; use [`TaskGuard::shutdown`] to wait for that.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Requests an abort. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// Aborts the task and waits until it has stopped.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            // Cancelled or panicked, it no longer runs either way
            let _ = handle.await;
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}
