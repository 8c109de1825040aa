//! Change notification
//!
//! After every successful mutation the store publishes a [`ChangeEvent`] on a
//! bounded broadcast channel. Subscribers drain it at their own pace; a slow
//! or absent subscriber can never make a mutation fail.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// A successful mutation of the store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A data file was opened (or created because it was missing)
    Opened,
    /// A fresh, empty data file replaced the current one
    Created,
    /// All records were removed
    Cleared,
    /// The data file was deleted from disk
    Dropped,
    Inserted { id: i32 },
    Deleted { id: i32 },
    DeletedWhere { count: usize },
    Updated { count: usize },
    Supplied { id: i32, amount: i32 },
    Sold { id: i32, amount: i32 },
    /// Content was replaced from a backup and indexes rebuilt
    Restored,
}

/// Publishing side, owned by the store
pub(crate) struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of the change channel. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Next pending event, if any, without blocking.
    ///
    /// Events lost to lag are skipped.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscriber lagged, {} events dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Block until the next event. `None` once the store is gone.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscriber lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take every pending event
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
