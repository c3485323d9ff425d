//! # Action Handle
//!
//! The only channel through which a running handler produces state. One
//! [`Actioner`] exists per handler invocation; it moves from *active* to
//! exactly one of *cancelled* or *completed* and never back.
//!
//! Cleanup callbacks ("disposables") registered on an actioner run exactly
//! once, no later than the moment it leaves the active state. Nested
//! subscriptions opened through [`Actioner::observe_each`] register one, so
//! cancelling the actioner also stops them.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::EngineState;
use crate::state_machine::StateStore;

/// Lifecycle of a single handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    Active,
    Cancelled,
    Completed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Cleanup callback owned by an actioner
pub type Disposable = Box<dyn FnOnce() + Send + 'static>;

/// Per-invocation handle a handler uses to emit states
///
/// Cloning is cheap and every clone refers to the same invocation, so a
/// handler may move clones into tasks it spawns.
pub struct Actioner<E, S> {
    inner: Arc<ActionerInner<E, S>>,
}

struct ActionerInner<E, S> {
    id: Uuid,
    store: Arc<StateStore<E, S>>,
    lifecycle: Mutex<Lifecycle<S>>,
    next_key: AtomicU64,
    finished: watch::Sender<bool>,
}

struct Lifecycle<S> {
    status: ActionStatus,
    output: Option<mpsc::UnboundedSender<S>>,
    disposables: Vec<(u64, Disposable)>,
}

impl<E, S> Clone for Actioner<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, S> fmt::Debug for Actioner<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actioner")
            .field("id", &self.inner.id)
            .field("status", &self.inner.lifecycle.lock().status)
            .finish()
    }
}

impl<E, S> Actioner<E, S> {
    /// Create an active actioner whose emissions are sent to `output`
    pub fn new(store: Arc<StateStore<E, S>>, output: mpsc::UnboundedSender<S>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(ActionerInner {
                id: Uuid::new_v4(),
                store,
                lifecycle: Mutex::new(Lifecycle {
                    status: ActionStatus::Active,
                    output: Some(output),
                    disposables: Vec::new(),
                }),
                next_key: AtomicU64::new(0),
                finished,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn status(&self) -> ActionStatus {
        self.inner.lifecycle.lock().status
    }

    /// True once cancelled or completed
    pub fn is_ended(&self) -> bool {
        self.status().is_terminal()
    }

    /// Send a candidate state towards the store
    ///
    /// Silently ignored once the actioner has ended, so a handler that keeps
    /// computing after cancellation never fails because of it.
    pub fn emit(&self, state: S) {
        let lifecycle = self.inner.lifecycle.lock();
        match (&lifecycle.status, &lifecycle.output) {
            (ActionStatus::Active, Some(output)) => {
                if output.send(state).is_err() {
                    trace!(actioner_id = %self.inner.id, "Invocation stream already dropped");
                }
            }
            _ => trace!(actioner_id = %self.inner.id, "Ignoring emit on ended actioner"),
        }
    }

    /// Register a cleanup callback, returning its key
    ///
    /// If the actioner has already ended the callback runs immediately and
    /// `None` is returned.
    pub fn add_disposable(&self, dispose: impl FnOnce() + Send + 'static) -> Option<u64> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.status.is_terminal() {
            drop(lifecycle);
            dispose();
            return None;
        }

        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        lifecycle.disposables.push((key, Box::new(dispose)));
        Some(key)
    }

    /// Remove and run the disposable registered under `key`
    pub fn dispose(&self, key: u64) -> bool {
        let dispose = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle
                .disposables
                .iter()
                .position(|(candidate, _)| *candidate == key)
                .map(|index| lifecycle.disposables.swap_remove(index).1)
        };

        match dispose {
            Some(dispose) => {
                dispose();
                true
            }
            None => false,
        }
    }

    /// Number of disposables still registered
    pub fn open_disposables(&self) -> usize {
        self.inner.lifecycle.lock().disposables.len()
    }

    /// Move to *cancelled* and run every disposable. No-op once ended.
    pub fn cancel(&self) {
        let disposables = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.status.is_terminal() {
                return;
            }
            lifecycle.status = ActionStatus::Cancelled;
            lifecycle.output = None;
            std::mem::take(&mut lifecycle.disposables)
        };

        debug!(
            actioner_id = %self.inner.id,
            disposables = disposables.len(),
            "🛑 Actioner cancelled"
        );

        for (_, dispose) in disposables {
            dispose();
        }
        self.inner.finished.send_replace(true);
    }

    /// Move to *completed*. No-op once ended.
    ///
    /// Fails with [`EngineError::CompletionOrdering`] while disposables are
    /// still registered: a nested subscription outliving its handler means the
    /// handler returned without awaiting it. The actioner stays active in that
    /// case so the caller can cancel it instead.
    pub fn complete(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.status.is_terminal() {
                return Ok(());
            }
            if !lifecycle.disposables.is_empty() {
                return Err(EngineError::CompletionOrdering {
                    actioner: self.inner.id,
                    remaining: lifecycle.disposables.len(),
                });
            }
            lifecycle.status = ActionStatus::Completed;
            lifecycle.output = None;
        }

        trace!(actioner_id = %self.inner.id, "✅ Actioner completed");
        self.inner.finished.send_replace(true);
        Ok(())
    }

    /// Resolves once the actioner is cancelled or completed
    pub async fn finished(&self) {
        let mut receiver = self.inner.finished.subscribe();
        // The sender lives in `self`, so this only returns once the flag flips
        let _ = receiver.wait_for(|done| *done).await;
    }
}

impl<E, S: EngineState> Actioner<E, S> {
    /// Live engine state, read at call time
    pub fn current_state(&self) -> S {
        self.inner.store.current_state()
    }

    /// Run `on_data` for every element of `source`
    ///
    /// Returns when the source finishes, when it errors, or when the actioner
    /// is cancelled, whichever comes first. Errors end this subscription only;
    /// they are logged and reported to the observer's `on_failure`.
    pub async fn observe_each<T, Err, St, D>(&self, source: St, on_data: D)
    where
        St: Stream<Item = std::result::Result<T, Err>> + Send,
        Err: Into<anyhow::Error>,
        D: FnMut(T) + Send,
        T: Send,
    {
        self.drive(source, on_data, None::<fn(anyhow::Error)>).await;
    }

    /// Like [`observe_each`](Self::observe_each), handing source errors to
    /// `on_error` and continuing with the next element
    pub async fn observe_each_or_else<T, Err, St, D, H>(&self, source: St, on_data: D, on_error: H)
    where
        St: Stream<Item = std::result::Result<T, Err>> + Send,
        Err: Into<anyhow::Error>,
        D: FnMut(T) + Send,
        H: FnMut(anyhow::Error) + Send,
        T: Send,
    {
        self.drive(source, on_data, Some(on_error)).await;
    }

    /// Emit the state `on_data` derives from each element of `source`
    pub async fn observe_each_as_state<T, Err, St, D>(&self, source: St, mut on_data: D)
    where
        St: Stream<Item = std::result::Result<T, Err>> + Send,
        Err: Into<anyhow::Error>,
        D: FnMut(T) -> S + Send,
        T: Send,
    {
        self.drive(
            source,
            move |value| self.emit(on_data(value)),
            None::<fn(anyhow::Error)>,
        )
        .await;
    }

    /// Emit derived states for elements and for errors alike
    pub async fn observe_each_as_state_or_else<T, Err, St, D, H>(
        &self,
        source: St,
        mut on_data: D,
        mut on_error: H,
    ) where
        St: Stream<Item = std::result::Result<T, Err>> + Send,
        Err: Into<anyhow::Error>,
        D: FnMut(T) -> S + Send,
        H: FnMut(anyhow::Error) -> S + Send,
        T: Send,
    {
        self.drive(
            source,
            move |value| self.emit(on_data(value)),
            Some(move |err: anyhow::Error| self.emit(on_error(err))),
        )
        .await;
    }

    async fn drive<T, Err, St, D, H>(&self, source: St, mut on_data: D, mut on_error: Option<H>)
    where
        St: Stream<Item = std::result::Result<T, Err>> + Send,
        Err: Into<anyhow::Error>,
        D: FnMut(T) + Send,
        H: FnMut(anyhow::Error) + Send,
        T: Send,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let Some(key) = self.add_disposable(move || {
            let _ = stop_tx.send(());
        }) else {
            trace!(actioner_id = %self.inner.id, "Skipping observe on ended actioner");
            return;
        };

        let mut source = std::pin::pin!(source);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    debug!(actioner_id = %self.inner.id, "Observed source cancelled");
                    break;
                }
                item = source.next() => match item {
                    Some(Ok(value)) => on_data(value),
                    Some(Err(err)) => {
                        let err: anyhow::Error = err.into();
                        match on_error.as_mut() {
                            Some(handle_error) => handle_error(err),
                            None => {
                                let failure = EngineError::SourceFailed {
                                    actioner: self.inner.id,
                                    message: format!("{err:#}"),
                                };
                                error!(actioner_id = %self.inner.id, error = %failure, "❌ Observed source failed");
                                self.inner.store.observer().on_failure(&failure);
                                break;
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        self.dispose(key);
    }
}
