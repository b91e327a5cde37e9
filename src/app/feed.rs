use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::adapters::device_api::ApiError;
use crate::domain::connection_state::ConnectionState;
use crate::domain::event_record::EventRecord;
use crate::domain::feed_store::{FeedStore, PrependOutcome};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed store lock poisoned")]
    LockPoisoned,
    #[error("history load failed: {0}")]
    History(#[from] ApiError),
}

/// Non-fatal problems reported to observers while the feed keeps running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedFault {
    #[error("undecodable push frame: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("history refresh failed: {0}")]
    History(String),
}

/// Data-only notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedNotification {
    Replaced {
        records: Vec<EventRecord>,
        event_count: u64,
    },
    RecordAdded {
        record: EventRecord,
        event_count: u64,
    },
    Cleared,
    ConnectionChanged(ConnectionState),
    Fault(FeedFault),
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<FeedNotification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FeedNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, notification: FeedNotification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("no observer attached, notification dropped");
        }
    }

    pub fn fault(&self, fault: FeedFault) {
        self.emit(FeedNotification::Fault(fault));
    }
}

/// Cloneable handle to the single timeline. Every mutation holds the store
/// lock only for the in-memory update, never across an await.
#[derive(Debug, Clone)]
pub struct SharedFeed {
    store: Arc<Mutex<FeedStore>>,
    notifier: Notifier,
}

impl SharedFeed {
    pub fn new(capacity: NonZeroUsize, notifier: Notifier) -> Self {
        Self {
            store: Arc::new(Mutex::new(FeedStore::new(capacity))),
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Notifications are sent while the store lock is held, so observers see
    /// them in the same order as the mutations.
    pub fn replace_all(&self, records: Vec<EventRecord>) -> Result<usize, FeedError> {
        let mut store = self.lock()?;
        let installed = store.replace_all(records);

        self.notifier.emit(FeedNotification::Replaced {
            records: store.snapshot(),
            event_count: store.event_count(),
        });
        Ok(installed)
    }

    pub fn prepend(&self, record: EventRecord) -> Result<PrependOutcome, FeedError> {
        let mut store = self.lock()?;
        let outcome = store.prepend(record.clone());

        match &outcome {
            PrependOutcome::Inserted { evicted } => {
                if let Some(evicted) = evicted {
                    tracing::debug!(evicted_id = ?evicted.dedup_key(), "feed full, evicted oldest record");
                }
                self.notifier.emit(FeedNotification::RecordAdded {
                    record,
                    event_count: store.event_count(),
                });
            }
            PrependOutcome::Duplicate { id } => {
                tracing::debug!(id, "dropping duplicate event");
            }
        }

        Ok(outcome)
    }

    pub fn clear(&self) -> Result<(), FeedError> {
        let mut store = self.lock()?;
        store.clear();
        self.notifier.emit(FeedNotification::Cleared);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Vec<EventRecord>, FeedError> {
        Ok(self.lock()?.snapshot())
    }

    pub fn event_count(&self) -> Result<u64, FeedError> {
        Ok(self.lock()?.event_count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, FeedStore>, FeedError> {
        self.store.lock().map_err(|_| FeedError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::{Arc, Barrier};

    use super::{FeedNotification, Notifier, SharedFeed};
    use crate::domain::feed_store::PrependOutcome;
    use crate::test_support::{drain, numbered_record};

    fn feed() -> (SharedFeed, tokio::sync::mpsc::UnboundedReceiver<FeedNotification>) {
        let (notifier, rx) = Notifier::channel();
        let capacity = NonZeroUsize::new(10).expect("capacity must be non-zero");
        (SharedFeed::new(capacity, notifier), rx)
    }

    #[test]
    fn replace_emits_full_snapshot() {
        let (feed, mut rx) = feed();

        feed.replace_all(vec![numbered_record(2), numbered_record(1)])
            .expect("replace should succeed");

        assert_eq!(
            drain(&mut rx),
            vec![FeedNotification::Replaced {
                records: vec![numbered_record(2), numbered_record(1)],
                event_count: 2,
            }]
        );
    }

    #[test]
    fn duplicate_prepend_is_silent() {
        let (feed, mut rx) = feed();
        feed.prepend(numbered_record(1)).expect("prepend should succeed");

        let outcome = feed
            .prepend(numbered_record(1))
            .expect("prepend should succeed");

        assert_eq!(outcome, PrependOutcome::Duplicate { id: 1 });
        assert_eq!(
            drain(&mut rx),
            vec![FeedNotification::RecordAdded {
                record: numbered_record(1),
                event_count: 1,
            }]
        );
    }

    #[test]
    fn clear_notifies_and_resets_count() {
        let (feed, mut rx) = feed();
        feed.prepend(numbered_record(1)).expect("prepend should succeed");

        feed.clear().expect("clear should succeed");

        assert_eq!(feed.event_count().expect("count should be readable"), 0);
        assert_eq!(drain(&mut rx).last(), Some(&FeedNotification::Cleared));
    }

    #[test]
    fn works_without_an_observer() {
        let (feed, rx) = feed();
        drop(rx);

        feed.prepend(numbered_record(1)).expect("prepend should succeed");

        assert_eq!(feed.snapshot().expect("snapshot should be readable").len(), 1);
    }

    #[test]
    fn last_notification_matches_store_under_concurrent_mutation() {
        for _ in 0..500 {
            let (feed, mut rx) = feed();
            let barrier = Arc::new(Barrier::new(2));

            let pusher = {
                let feed = feed.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    feed.prepend(numbered_record(4)).expect("prepend should succeed");
                })
            };
            let poller = {
                let feed = feed.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    feed.replace_all(vec![numbered_record(1)])
                        .expect("replace should succeed");
                })
            };
            pusher.join().expect("pusher thread should finish");
            poller.join().expect("poller thread should finish");

            let snapshot = feed.snapshot().expect("snapshot should be readable");
            let notifications = drain(&mut rx);
            match notifications.last() {
                Some(FeedNotification::RecordAdded { record, .. }) => {
                    assert_eq!(snapshot.first(), Some(record));
                    assert_eq!(snapshot.len(), 2);
                }
                Some(FeedNotification::Replaced { records, .. }) => {
                    assert_eq!(&snapshot, records);
                }
                other => panic!("unexpected final notification: {other:?}"),
            }
        }
    }
}
