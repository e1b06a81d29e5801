//! Task spawning abstraction.
//!
//! The listener spawns one task per connection and the session repository
//! spawns one task per creation. Both go through [`TaskSpawner`] so embedders
//! can route the work onto a runtime of their choosing.

use std::future::Future;

/// Abstraction for spawning detached background tasks.
///
/// Spawned tasks run to completion independently of the caller; there is no
/// join handle. Cancellation is the task's own concern (see
/// [`tokio_util::sync::CancellationToken`]).
pub trait TaskSpawner: Send + Sync {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-backed spawner.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a spawner bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn spawned_task_runs_detached() {
        let spawner = TokioSpawner::current();
        let (tx, rx) = oneshot::channel();

        spawner.spawn(async move {
            let _ = tx.send(42);
        });

        assert_eq!(rx.await.unwrap(), 42);
    }
}
