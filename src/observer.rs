//! # Observer Hooks
//!
//! Passive lifecycle-notification sink. The engine calls into an observer at
//! every step of an event's life; observers have no return value and no veto
//! power. Every notification for a commit happens before that commit is
//! published to state subscribers.

use crate::error::EngineError;
use crate::state_machine::{Modify, Progression};
use std::fmt::Debug;
use tracing::{debug, error, info};

/// Lifecycle notifications emitted by a [`StateEngine`](crate::StateEngine)
///
/// All methods default to no-ops so implementors override only what they need.
/// Hooks may read engine state; `on_modify` and `on_completion` must not
/// commit new states from inside the hook.
pub trait ObserverHook<E, S>: Send + Sync {
    /// The engine was constructed with `initial` as its state
    fn on_init(&self, _initial: &S) {}

    /// An event was accepted by `submit`
    fn on_event_received(&self, _event: &E) {}

    /// The state store committed a transition
    fn on_modify(&self, _modify: &Modify<S>) {}

    /// A handler produced a new state for `event`, about to be committed
    fn on_progression(&self, _progression: &Progression<E, S>) {}

    /// A handler, source, or event interceptor failed
    fn on_failure(&self, _error: &EngineError) {}

    /// The state stream is about to close
    fn on_completion(&self) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<E, S> ObserverHook<E, S> for NoopObserver {}

/// Observer that records every notification through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    name: String,
}

impl TracingObserver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<E: Debug, S: Debug> ObserverHook<E, S> for TracingObserver {
    fn on_init(&self, initial: &S) {
        info!(engine = %self.name, initial = ?initial, "🚀 Engine initialized");
    }

    fn on_event_received(&self, event: &E) {
        debug!(engine = %self.name, event = ?event, "📥 Event received");
    }

    fn on_modify(&self, modify: &Modify<S>) {
        debug!(engine = %self.name, from = ?modify.current, to = ?modify.next, "🔄 State modified");
    }

    fn on_progression(&self, progression: &Progression<E, S>) {
        debug!(
            engine = %self.name,
            event = ?progression.event,
            from = ?progression.current,
            to = ?progression.next,
            "➡️ State progression"
        );
    }

    fn on_failure(&self, failure: &EngineError) {
        error!(engine = %self.name, error = %failure, "❌ Engine failure");
    }

    fn on_completion(&self) {
        info!(engine = %self.name, "🏁 Engine completed");
    }
}
