//! Process-owned scheduled tasks
//!
//! Interval and one-shot timers are spawned on a shared tracker so that
//! shutdown can stop the intervals, fire pending one-shots immediately and
//! wait for everything to drain.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period` until shutdown. The first run happens one
    /// period after registration.
    pub fn every<F, Fut>(&self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() yields immediately on the first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => task().await,
                }
            }
            tracing::debug!(task = name, "Interval task stopped");
        });
    }

    /// Run `task` once after `delay`, or straight away if shutdown starts first
    pub fn after<Fut>(&self, name: &'static str, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(task = name, "Running delayed task early for shutdown");
                }
                () = tokio::time::sleep(delay) => {}
            }
            task.await;
        });
    }

    /// Number of tasks still running or waiting
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop intervals, flush one-shots and wait up to `timeout` for them.
    /// Returns false when the timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            tracing::info!("Scheduler stopped");
            true
        } else {
            tracing::warn!(pending = self.tracker.len(), "Scheduler shutdown timed out");
            false
        }
    }
}
