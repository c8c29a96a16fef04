//! Periodic background sweep for the in-memory stores.
//!
//! Each store owns at most one [`Sweeper`]. The task holds only a weak
//! reference to the store, so dropping the store also ends the task, and the
//! cancellation token is checked between sweep cycles, never during one.
//!
//! ```ignore
//! let sweeper = Sweeper::spawn("cache", Arc::downgrade(&inner), Duration::from_secs(60))?;
//! // ...
//! sweeper.stop().await;
//! ```

use shared::{Error, Result};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something with expired entries to drop.
pub trait Sweep: Send + Sync + 'static {
    /// Remove every expired entry, returning how many were removed
    fn sweep(&self) -> usize;
}

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a sweep task on the current tokio runtime.
    ///
    /// Fails with [`Error::Internal`] when called outside a runtime.
    pub fn spawn<S: Sweep>(
        name: &'static str,
        target: Weak<S>,
        interval: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("Cannot start {} sweeper: {}", name, e)))?;
        if interval.is_zero() {
            return Err(Error::InvalidInput(format!(
                "{} sweep interval must be greater than zero",
                name
            )));
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();

        let handle = runtime.spawn(async move {
            info!(
                sweeper = name,
                interval_secs = interval.as_secs(),
                "Sweeper starting"
            );

            let mut ticker = tokio::time::interval(interval);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        info!(sweeper = name, "Sweeper shutting down");
                        break;
                    }

                    _ = ticker.tick() => {
                        let Some(store) = target.upgrade() else {
                            debug!(sweeper = name, "Store dropped, sweeper exiting");
                            break;
                        };

                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(sweeper = name, removed, "Swept expired entries");
                        }
                    }
                }
            }
        });

        Ok(Self {
            name,
            token,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task and wait for it to finish its current cycle.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        sweeps: AtomicUsize,
    }

    impl Sweep for Counter {
        fn sweep(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let target = Arc::new(Counter::default());
        let result = Sweeper::spawn("test", Arc::downgrade(&target), Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_interval_and_stops() {
        let target = Arc::new(Counter::default());
        let sweeper =
            Sweeper::spawn("test", Arc::downgrade(&target), Duration::from_secs(10)).unwrap();

        // No sweep on the immediate first tick
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);

        sweeper.stop().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_target_dropped() {
        let target = Arc::new(Counter::default());
        let sweeper =
            Sweeper::spawn("test", Arc::downgrade(&target), Duration::from_secs(1)).unwrap();

        drop(target);
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(!sweeper.is_running());
    }
}
