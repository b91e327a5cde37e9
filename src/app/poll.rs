use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::adapters::device_api::HistoryLoader;
use crate::app::feed::{FeedFault, SharedFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTarget {
    pub device_id: NonZeroU32,
    pub limit: NonZeroU32,
}

/// Periodically replaces the feed with a fresh history snapshot.
///
/// At most one timer task exists. Every `start`/`stop` retires the previous
/// generation, so a response that lands after `stop` is discarded instead of
/// overwriting the feed.
pub struct PollScheduler<L> {
    loader: Arc<L>,
    feed: SharedFeed,
    target: PollTarget,
    task: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
}

impl<L> PollScheduler<L>
where
    L: HistoryLoader,
{
    pub fn new(loader: Arc<L>, feed: SharedFeed, target: PollTarget) -> Self {
        Self {
            loader,
            feed,
            target,
            task: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Must be called from within a tokio runtime. Returns `false` when
    /// already running or when `period` is zero.
    pub fn start(&mut self, period: Duration) -> bool {
        if period.is_zero() {
            tracing::warn!("auto refresh needs a non-zero period");
            return false;
        }
        if self.task.is_some() {
            tracing::debug!("poll scheduler already running");
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let loader = Arc::clone(&self.loader);
        let feed = self.feed.clone();
        let target = self.target;
        let current = Arc::clone(&self.generation);

        tracing::info!(
            period_ms = period.as_millis() as u64,
            device_id = target.device_id.get(),
            "auto refresh started"
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                poll_once(loader.as_ref(), &feed, target, &current, generation).await;
            }
        }));

        true
    }

    /// Returns `false` when nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        task.abort();
        tracing::info!("auto refresh stopped");
        true
    }
}

impl<L> Drop for PollScheduler<L> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_once<L>(
    loader: &L,
    feed: &SharedFeed,
    target: PollTarget,
    current: &AtomicU64,
    generation: u64,
) where
    L: HistoryLoader + ?Sized,
{
    let result = loader.load_history(target.device_id, target.limit).await;

    if current.load(Ordering::SeqCst) != generation {
        tracing::debug!(generation, "discarding poll result from retired generation");
        return;
    }

    match result {
        Ok(records) => match feed.replace_all(records) {
            Ok(count) => tracing::debug!(count, "auto refresh applied snapshot"),
            Err(error) => tracing::error!(error = %error, "failed to apply polled snapshot"),
        },
        Err(error) => {
            tracing::warn!(error = %error, "auto refresh failed");
            feed.notifier().fault(FeedFault::History(error.to_string()));
        }
    }
}
