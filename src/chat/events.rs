//! Event bus: broadcast fan-out of inbound chat events to waiters.
//!
//! The router publishes every inbound event here; interactive flows
//! subscribe and wait for the first event matching a filter. A waiter that
//! is dropped (e.g. the losing branch of a `select!`) simply drops its
//! receiver, so nothing stays subscribed past its turn.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use super::model::ChatEvent;

/// Default broadcast channel capacity.
const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Cloneable publish/subscribe handle.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Ok if nobody is waiting.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe now; events published after this call are observed.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn waiter_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe and wait for the first event the filter maps to `Some`.
    /// Returns `None` on timeout.
    pub async fn wait_for<T, F>(&self, timeout: Duration, filter: F) -> Option<T>
    where
        F: FnMut(&ChatEvent) -> Option<T>,
    {
        let mut sub = self.subscribe();
        tokio::time::timeout(timeout, sub.next_matching(filter))
            .await
            .ok()
            .flatten()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A single subscription to the bus.
pub struct EventSubscription {
    rx: broadcast::Receiver<ChatEvent>,
}

impl EventSubscription {
    /// Wait for the next event the filter maps to `Some`. Returns `None` once
    /// the bus is closed.
    pub async fn next_matching<T, F>(&mut self, mut filter: F) -> Option<T>
    where
        F: FnMut(&ChatEvent) -> Option<T>,
    {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(hit) = filter(&event) {
                        return Some(hit);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
