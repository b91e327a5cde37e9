use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::domain::event_record::EventRecord;

pub const DEFAULT_FEED_CAPACITY: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(capacity) => capacity,
    None => panic!("default feed capacity must be non-zero"),
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrependOutcome {
    Inserted { evicted: Option<EventRecord> },
    Duplicate { id: i64 },
}

/// Ordered, bounded event timeline, newest first.
///
/// Records with a numeric `id_evento` are deduplicated on `prepend`; records
/// without one are always accepted. `replace_all` installs a backend snapshot
/// verbatim (truncated to capacity) and never deduplicates.
#[derive(Debug, Clone)]
pub struct FeedStore {
    records: VecDeque<EventRecord>,
    capacity: NonZeroUsize,
    event_count: u64,
}

impl FeedStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.get()),
            capacity,
            event_count: 0,
        }
    }

    pub fn replace_all(&mut self, mut records: Vec<EventRecord>) -> usize {
        if records.len() > self.capacity.get() {
            tracing::debug!(
                received = records.len(),
                capacity = self.capacity.get(),
                "truncating snapshot to feed capacity"
            );
            records.truncate(self.capacity.get());
        }

        self.records = VecDeque::from(records);
        self.event_count = self.records.len() as u64;
        self.records.len()
    }

    pub fn prepend(&mut self, record: EventRecord) -> PrependOutcome {
        if let Some(id) = record.dedup_key()
            && self.contains_id(id)
        {
            return PrependOutcome::Duplicate { id };
        }

        let evicted = if self.records.len() >= self.capacity.get() {
            self.records.pop_back()
        } else {
            None
        };

        self.records.push_front(record);
        self.event_count += 1;

        PrependOutcome::Inserted { evicted }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.event_count = 0;
    }

    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.records
            .iter()
            .any(|record| record.dedup_key() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Records accepted since the last reset. Display only; evictions do not
    /// decrement it.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
