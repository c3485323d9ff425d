//! Authoritative state cell with deduplicated, broadcast commits.

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::transitions::Modify;
use crate::error::{EngineError, Result};
use crate::events::EngineState;
use crate::observer::ObserverHook;

/// Owns the current state and publishes every accepted transition
///
/// Commits are serialized behind a dedicated commit lock, so they are totally
/// ordered and the observer's `on_modify` for a commit always runs before that
/// commit reaches subscribers. Observer hooks run without the state lock held
/// and may read the store; they must not commit to it.
pub struct StateStore<E, S> {
    commit: Mutex<()>,
    inner: Mutex<StoreInner<S>>,
    observer: Arc<dyn ObserverHook<E, S>>,
}

struct StoreInner<S> {
    current: S,
    transitioned: bool,
    committed: u64,
    sender: Option<broadcast::Sender<S>>,
}

impl<E, S: EngineState> StateStore<E, S> {
    /// Create a store holding `initial`, publishing on a channel of `capacity`
    pub fn new(initial: S, capacity: usize, observer: Arc<dyn ObserverHook<E, S>>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            commit: Mutex::new(()),
            inner: Mutex::new(StoreInner {
                current: initial,
                transitioned: false,
                committed: 0,
                sender: Some(sender),
            }),
            observer,
        }
    }

    /// Commit `candidate` unless it repeats the last committed state
    ///
    /// The first candidate always commits, even when it equals the initial
    /// state. Fails with [`EngineError::Terminated`] once the store has ended.
    pub fn apply(&self, candidate: S) -> Result<()> {
        let _commit = self.commit.lock();

        let (previous, sender) = {
            let mut inner = self.inner.lock();
            let Some(sender) = inner.sender.clone() else {
                return Err(EngineError::Terminated);
            };

            if inner.transitioned && inner.current == candidate {
                return Ok(());
            }

            let previous = std::mem::replace(&mut inner.current, candidate.clone());
            inner.transitioned = true;
            inner.committed += 1;
            (previous, sender)
        };

        self.observer.on_modify(&Modify::new(previous, candidate.clone()));

        // No subscribers is fine; the state is still committed
        let _ = sender.send(candidate);
        Ok(())
    }

    /// Latest committed state
    pub fn current_state(&self) -> S {
        self.inner.lock().current.clone()
    }

    /// Whether at least one transition has been committed since construction
    pub fn has_transitioned(&self) -> bool {
        self.inner.lock().transitioned
    }

    /// Number of committed transitions
    pub fn transitions_committed(&self) -> u64 {
        self.inner.lock().committed
    }

    /// Receiver for every commit from now on; already closed if the store has ended
    pub fn subscribe(&self) -> broadcast::Receiver<S> {
        match self.inner.lock().sender.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        }
    }

    /// Stream of every commit from now on, ending when the store ends
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the oldest states and keeps going.
    pub fn subscribe_stream(&self) -> BoxStream<'static, S> {
        stream::unfold(self.subscribe(), |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(state) => return Some((state, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "⚠️ State subscriber lagged, skipping states");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().sender.is_none()
    }

    /// Notify completion and close the state stream. Later calls are no-ops.
    pub fn end(&self) {
        let _commit = self.commit.lock();

        let (sender, committed) = {
            let mut inner = self.inner.lock();
            match inner.sender.take() {
                Some(sender) => (sender, inner.committed),
                None => return,
            }
        };

        self.observer.on_completion();
        drop(sender);
        debug!(committed, "🏁 State store closed");
    }

    pub fn observer(&self) -> &Arc<dyn ObserverHook<E, S>> {
        &self.observer
    }
}
