//! # Event and State Typing
//!
//! Events are tagged unions: each value reports a copyable discriminant
//! ([`EngineEvent::Variant`]) and handlers are registered per discriminant.
//! States are plain values compared by equality.

pub mod bus;

use std::fmt::Debug;
use std::hash::Hash;

pub use bus::EventBus;

/// An event the engine can route to exactly one registered handler
///
/// ```rust
/// use transition_engine::EngineEvent;
///
/// #[derive(Debug, Clone)]
/// enum CounterEvent {
///     Increment,
///     Set(i64),
/// }
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum CounterVariant {
///     Increment,
///     Set,
/// }
///
/// impl EngineEvent for CounterEvent {
///     type Variant = CounterVariant;
///
///     fn variant(&self) -> CounterVariant {
///         match self {
///             Self::Increment => CounterVariant::Increment,
///             Self::Set(_) => CounterVariant::Set,
///         }
///     }
/// }
/// ```
pub trait EngineEvent: Clone + Send + Sync + Debug + 'static {
    /// Discriminant used as the registration key
    type Variant: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The variant this event belongs to
    fn variant(&self) -> Self::Variant;

    /// Whether this event belongs to `variant`
    fn is_variant(&self, variant: Self::Variant) -> bool {
        self.variant() == variant
    }
}

/// A state value owned by the engine; handlers only ever see copies
pub trait EngineState: Clone + PartialEq + Send + Sync + Debug + 'static {}

impl<T> EngineState for T where T: Clone + PartialEq + Send + Sync + Debug + 'static {}
