//! Task polling utilities
//!
//! The GUI loop never awaits. Gateway requests are spawned on the tokio
//! runtime and polled once per frame through [`PendingRequest`].

use std::future::Future;

use futures::FutureExt;
use tokio::task::JoinHandle;

/// Result of polling a task
pub enum PollResult<T> {
    /// Nothing in flight
    NoTask,
    /// Task is still running
    Pending,
    /// Task completed with result (may be Ok or join error)
    Complete(Result<T, tokio::task::JoinError>),
}

/// A request spawned on the runtime whose result is picked up by polling.
pub struct PendingRequest<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T> Default for PendingRequest<T> {
    fn default() -> Self {
        Self { handle: None }
    }
}

impl<T: Send + 'static> PendingRequest<T> {
    /// Spawn `future`. Returns `false` and does nothing if one is already running.
    pub fn spawn<F>(&mut self, future: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        if self.handle.is_some() {
            return false;
        }
        self.handle = Some(tokio::spawn(future));
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Take the result if the task has finished.
    ///
    /// Typical use in a frame:
    /// ```ignore
    /// match self.version_request.poll() {
    ///     PollResult::Complete(Ok(version)) => { /* success */ }
    ///     PollResult::Complete(Err(e)) => { /* task panicked */ }
    ///     PollResult::Pending => ctx.request_repaint(),
    ///     PollResult::NoTask => {}
    /// }
    /// ```
    pub fn poll(&mut self) -> PollResult<T> {
        let Some(handle) = self.handle.as_ref() else {
            return PollResult::NoTask;
        };
        if !handle.is_finished() {
            return PollResult::Pending;
        }

        let Some(handle) = self.handle.take() else {
            return PollResult::NoTask;
        };
        match handle.now_or_never() {
            Some(result) => PollResult::Complete(result),
            None => {
                tracing::warn!("Task not ready despite is_finished()");
                PollResult::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_complete<T: Send + 'static>(request: &mut PendingRequest<T>) -> T {
        loop {
            match request.poll() {
                PollResult::Complete(result) => return result.unwrap(),
                PollResult::Pending => tokio::time::sleep(Duration::from_millis(5)).await,
                PollResult::NoTask => panic!("nothing in flight"),
            }
        }
    }

    #[tokio::test]
    async fn test_poll_lifecycle() {
        let mut request = PendingRequest::default();
        assert!(matches!(request.poll(), PollResult::NoTask));

        assert!(request.spawn(async { 42 }));
        assert!(request.is_running());
        assert_eq!(wait_complete(&mut request).await, 42);

        assert!(!request.is_running());
        assert!(matches!(request.poll(), PollResult::NoTask));
    }

    #[tokio::test]
    async fn test_second_spawn_refused_while_running() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u8>();
        let mut request = PendingRequest::default();

        assert!(request.spawn(async move { rx.await.unwrap_or(0) }));
        assert!(!request.spawn(async { 99 }));

        tx.send(7).unwrap();
        assert_eq!(wait_complete(&mut request).await, 7);
    }
}
