#![allow(clippy::missing_errors_doc)] // Error conditions are documented on EngineError variants
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Transition Engine
//!
//! Event-driven, asynchronous state container. Callers submit events; a
//! handler registered for the event's variant runs asynchronously and emits
//! new states through its [`Actioner`]; accepted states are committed to a
//! single authoritative store and broadcast to subscribers.
//!
//! ## Architecture
//!
//! - **State store**: single-writer cell holding the current state. The first
//!   commit always goes through; later commits equal to the current state are
//!   suppressed.
//! - **Router**: one handler per event variant, each behind a pluggable
//!   [`ConcurrencyPolicy`] (merge, sequential, latest, exhaust).
//! - **Action handles**: per-invocation capabilities with exactly-once
//!   cleanup callbacks and cooperative cancellation.
//! - **Shutdown barrier**: [`StateEngine::end`] resolves only after every live
//!   invocation has reached a terminal state.
//! - **Observer hooks**: passive lifecycle notifications, see [`ObserverHook`].
//!
//! ## Module Organization
//!
//! - [`engine`] - Router, registration, submission, and shutdown
//! - [`execution`] - Action handles, concurrency policies, live-invocation registry
//! - [`state_machine`] - State store and transition records
//! - [`events`] - Event/state typing and the internal event bus
//! - [`observer`] - Lifecycle notification hooks
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use transition_engine::{Actioner, EngineEvent, StateEngine, TracingObserver};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! enum CounterEvent {
//!     Increment,
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum CounterVariant {
//!     Increment,
//! }
//!
//! impl EngineEvent for CounterEvent {
//!     type Variant = CounterVariant;
//!
//!     fn variant(&self) -> CounterVariant {
//!         CounterVariant::Increment
//!     }
//! }
//!
//! # async fn example() -> transition_engine::Result<()> {
//! transition_engine::logging::init_structured_logging();
//!
//! let engine = StateEngine::<CounterEvent, i64>::builder(0)
//!     .observer(Arc::new(TracingObserver::new("counter")))
//!     .build()?;
//!
//! engine.register(
//!     CounterVariant::Increment,
//!     |_event: CounterEvent, actioner: Actioner<CounterEvent, i64>| async move {
//!         actioner.emit(actioner.current_state() + 1);
//!         anyhow::Ok(())
//!     },
//! )?;
//!
//! engine.submit(CounterEvent::Increment)?;
//! engine.end().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod observer;
pub mod state_machine;

pub use config::{ConfigManager, ConfigurationError, EngineConfig};
pub use engine::{EngineBuilder, EngineStats, EventInterceptor, StateEngine};
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EngineState, EventBus};
pub use execution::{
    ActionStatus, Actioner, ConcurrencyMode, ConcurrencyPolicy, Emission, EventHandler,
    ExhaustPolicy, InvocationStream, LatestPolicy, MergePolicy, SequentialPolicy,
};
pub use observer::{NoopObserver, ObserverHook, TracingObserver};
pub use state_machine::{Modify, Progression, StateStore};
