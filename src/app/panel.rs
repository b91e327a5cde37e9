use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::device_api::HistoryLoader;
use crate::adapters::monitor_ws::Connector;
use crate::app::feed::{FeedError, Notifier, SharedFeed};
use crate::app::live::{LiveConnection, PushPolicy};
use crate::app::poll::{PollScheduler, PollTarget};
use crate::domain::clock::Clock;
use crate::domain::connection_state::ConnectionState;
use crate::domain::event_record::EventRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSettings {
    pub device_id: NonZeroU32,
    pub history_limit: NonZeroU32,
    pub feed_capacity: NonZeroUsize,
    pub poll_interval: Duration,
    pub push_policy: PushPolicy,
}

/// Wires the history loader, live connection and poll scheduler into one
/// feed. Live push and auto refresh may run together; a poll tick then
/// replaces the feed with the backend view, which can briefly hide a pushed
/// record the backend has not yet listed.
pub struct MonitorPanel<L, C> {
    loader: Arc<L>,
    feed: SharedFeed,
    live: LiveConnection<C>,
    poller: PollScheduler<L>,
    settings: PanelSettings,
}

impl<L, C> MonitorPanel<L, C>
where
    L: HistoryLoader,
    C: Connector,
{
    pub fn new(
        loader: Arc<L>,
        connector: C,
        settings: PanelSettings,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let feed = SharedFeed::new(settings.feed_capacity, notifier);
        let live = LiveConnection::new(connector, feed.clone(), clock, settings.push_policy);
        let poller = PollScheduler::new(
            Arc::clone(&loader),
            feed.clone(),
            PollTarget {
                device_id: settings.device_id,
                limit: settings.history_limit,
            },
        );

        Self {
            loader,
            feed,
            live,
            poller,
            settings,
        }
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    /// Replaces the feed with a fresh snapshot. On failure the feed keeps its
    /// previous contents.
    pub async fn load_history(&self) -> Result<usize, FeedError> {
        let records = self
            .loader
            .load_history(self.settings.device_id, self.settings.history_limit)
            .await?;

        let installed = self.feed.replace_all(records)?;
        tracing::info!(
            device_id = self.settings.device_id.get(),
            count = installed,
            "history loaded"
        );
        Ok(installed)
    }

    pub fn connect_live(&self) {
        if self.poller.is_running() {
            tracing::warn!("live push enabled while auto refresh is running; poll ticks replace pushed records");
        }
        self.live.connect();
    }

    pub fn disconnect_live(&self) {
        self.live.disconnect();
    }

    pub fn toggle_live(&self) {
        match self.live.state() {
            ConnectionState::Connected | ConnectionState::Connecting => self.live.disconnect(),
            ConnectionState::Disconnected | ConnectionState::Closing => self.connect_live(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.live.state()
    }

    pub fn start_auto_refresh(&mut self) -> bool {
        if self.live.state() == ConnectionState::Connected {
            tracing::warn!("auto refresh enabled while live push is connected; poll ticks replace pushed records");
        }
        self.poller.start(self.settings.poll_interval)
    }

    pub fn stop_auto_refresh(&mut self) -> bool {
        self.poller.stop()
    }

    pub fn auto_refresh_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn clear(&self) -> Result<(), FeedError> {
        self.feed.clear()
    }

    pub fn snapshot(&self) -> Result<Vec<EventRecord>, FeedError> {
        self.feed.snapshot()
    }

    pub fn event_count(&self) -> Result<u64, FeedError> {
        self.feed.event_count()
    }

    pub fn shutdown(&mut self) {
        self.poller.stop();
        self.live.disconnect();
    }
}
