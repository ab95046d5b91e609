//! Broadcast bus owned by one governance session.

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::event::SessionEvent;

/// Default channel capacity for a session bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Publish/subscribe channel scoped to a single session.
///
/// Events are delivered in publish order to every live subscriber. The bus
/// is dropped together with the session that owns it; subscribers observe
/// the close as the end of their receive stream.
#[derive(Debug)]
pub struct SessionBus {
    sender: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl SessionBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event. Publishing with
    /// no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        trace!(kind = event.kind(), "publishing session event");
        match self.sender.send(event) {
            Ok(count) => {
                debug!(receivers = count, "session event delivered");
                count
            },
            Err(_) => 0,
        }
    }

    /// Subscribe to all events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.sender.subscribe(),
        }
    }

    /// Current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity the bus was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`SessionBus`] subscription.
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<SessionEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` when the bus has been dropped (session ended). Lagged
    /// receivers skip missed events and continue with the next available one.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event receiver lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
