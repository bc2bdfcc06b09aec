//! Change feed for observing committed transactions.
//!
//! Each [`crate::MapStorage`] owns one feed. After a transaction's batch has
//! been applied to the backend, one event per touched key is emitted, in
//! batch order. Rolled back transactions emit nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! let receiver = storage.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{} {:?} {}", event.kind, event.change_type, event.key);
//!     }
//! });
//! ```

use crate::types::TransactionId;
use mapstore_storage::AppliedKind;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Entity was inserted (no previous version existed).
    Insert,
    /// Entity was replaced.
    Update,
    /// Entity was deleted.
    Delete,
}

impl From<AppliedKind> for ChangeType {
    fn from(kind: AppliedKind) -> Self {
        match kind {
            AppliedKind::Inserted => Self::Insert,
            AppliedKind::Replaced => Self::Update,
            AppliedKind::Removed => Self::Delete,
        }
    }
}

/// A single change event from the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Feed-wide sequence number, starting at 1.
    pub sequence: u64,
    /// The committing transaction.
    pub txid: TransactionId,
    /// Entity kind name.
    pub kind: String,
    /// Key, rendered through the storage's key converter.
    pub key: String,
    /// Type of change.
    pub change_type: ChangeType,
}

/// A change feed that distributes committed changes to subscribers.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    max_history: usize,
    next_sequence: AtomicU64,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits the changes of one commit, assigning consecutive sequence
    /// numbers.
    pub fn publish<I>(&self, txid: TransactionId, kind: &str, changes: I)
    where
        I: IntoIterator<Item = (String, ChangeType)>,
    {
        for (key, change_type) in changes {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            self.emit(ChangeEvent {
                sequence,
                txid,
                kind: kind.to_string(),
                key,
                change_type,
            });
        }
    }

    fn emit(&self, event: ChangeEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        // Disconnected subscribers are dropped here.
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns events with sequence > cursor, up to limit.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number in history.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last().map_or(0, |e| e.sequence)
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
