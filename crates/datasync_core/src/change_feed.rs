//! Change feed for observing committed table writes.
//!
//! The feed receives one [`RepositoryUpdated`] event per successful create,
//! update or delete, after the repository has stored it. Subscribers get
//! events in commit order; a bounded history supports catch-up polling.
//!
//! ```rust
//! use datasync_core::{ChangeFeed, TableData, TableOperation};
//!
//! let feed = ChangeFeed::new();
//! let receiver = feed.subscribe();
//!
//! feed.publish(TableOperation::Create, "movies", &TableData::new("m1"));
//!
//! let event = receiver.recv().unwrap();
//! assert_eq!(event.entity_id, "m1");
//! ```

use crate::access::TableOperation;
use crate::entity::TableData;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// A committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryUpdated {
    /// Position of the event in the feed, starting at 1.
    pub sequence: u64,
    /// The operation that was committed.
    pub operation: TableOperation,
    /// Name of the table.
    pub table: String,
    /// Id of the entity written.
    pub entity_id: String,
    /// The entity as stored (the last stored copy for hard deletes).
    pub entity: TableData,
    /// Time the event was published.
    pub timestamp: DateTime<Utc>,
}

/// Distributes committed writes to subscribers.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<RepositoryUpdated>>>,
    history: RwLock<VecDeque<RepositoryUpdated>>,
    max_history: usize,
    next_sequence: Mutex<u64>,
}

impl ChangeFeed {
    /// Creates a change feed keeping the last 10000 events.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            next_sequence: Mutex::new(1),
        }
    }

    /// Subscribes to all future events.
    ///
    /// The receiver should be drained regularly; dropped receivers are pruned
    /// on the next publish.
    pub fn subscribe(&self) -> Receiver<RepositoryUpdated> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes a committed write and returns its sequence number.
    pub fn publish(&self, operation: TableOperation, table: &str, entity: &TableData) -> u64 {
        // Holding the sequence lock while fanning out keeps delivery in
        // sequence order across threads.
        let mut next = self.next_sequence.lock();
        let event = RepositoryUpdated {
            sequence: *next,
            operation,
            table: table.to_string(),
            entity_id: entity.id.clone(),
            entity: entity.clone(),
            timestamp: Utc::now(),
        };
        *next += 1;

        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        event.sequence
    }

    /// Returns events with sequence greater than `cursor`, up to `limit`.
    pub fn events_since(&self, cursor: u64, limit: usize) -> Vec<RepositoryUpdated> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number published, or 0.
    pub fn latest_sequence(&self) -> u64 {
        *self.next_sequence.lock() - 1
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
