//! Change notification for the module store.
//!
//! Consumers either subscribe for pushed events or poll the revision
//! counter. Events are fire-and-forget; a bus with no subscribers drops
//! them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ModulesChanged { revision: u64 },
}

#[derive(Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<StoreEvent>,
    revision: Arc<AtomicU64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> ChangeSubscriber {
        ChangeSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Bumps the revision and notifies subscribers.
    pub fn notify(&self) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        // Err only means nobody is listening
        let _ = self.sender.send(StoreEvent::ModulesChanged { revision });
        tracing::debug!(revision, "modules changed");
        revision
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChangeSubscriber {
    receiver: broadcast::Receiver<StoreEvent>,
}

impl ChangeSubscriber {
    /// Returns the next pending event without blocking. A lagged subscriber
    /// skips to the newest events it still has.
    pub fn try_next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains pending events; true if any arrived.
    pub fn has_changes(&mut self) -> bool {
        let mut changed = false;
        while self.try_next().is_some() {
            changed = true;
        }
        changed
    }
}
