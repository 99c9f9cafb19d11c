use std::future::Future;

use tokio::task::JoinHandle;

/// Owned handle for a background timer task.
///
/// The task is aborted on [`TimerHandle::cancel`] and when the handle is
/// dropped.
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Spawn `task` on the current Tokio runtime.
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(task)),
        }
    }

    /// A handle that owns no task.
    pub fn inert() -> Self {
        Self { task: None }
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_task() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let handle = TimerHandle::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        drop(handle);
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(seen, 3);
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn inert_handle_is_finished() {
        assert!(TimerHandle::inert().is_finished());
    }
}
