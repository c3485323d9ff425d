use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{EngineError, Result};

/// Internal event backbone
///
/// Every subscriber receives every published event, in publication order,
/// through its own unbounded queue, so a slow pipeline never loses events the
/// way a lagging broadcast receiver would. Closing the bus drops all senders,
/// which ends every subscriber's stream once its queue is drained.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E: Clone> EventBus<E> {
    /// Create an open bus with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    /// Publish an event to every live subscriber, returning how many received it
    pub fn publish(&self, event: E) -> Result<usize> {
        let mut guard = self.subscribers.lock();
        let subscribers = guard.as_mut().ok_or(EngineError::Terminated)?;

        // Receivers dropped by finished pipelines are pruned on the way
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        trace!(delivered = subscribers.len(), "📨 Event published");

        Ok(subscribers.len())
    }

    /// Subscribe to all future events; `None` once the bus is closed
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<E>> {
        let mut guard = self.subscribers.lock();
        let subscribers = guard.as_mut()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        subscribers.push(sender);
        Some(receiver)
    }

    /// Close the bus. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.subscribers.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.subscribers.lock().is_none()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().as_ref().map_or(0, Vec::len)
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
