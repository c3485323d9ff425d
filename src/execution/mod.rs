//! # Execution
//!
//! Per-invocation machinery behind the engine: action handles, handler
//! registrations, the live-invocation registry, and the concurrency policies
//! that flatten per-event output into one stream per variant.

pub mod actioner;
pub mod concurrency;
pub mod controller;
pub mod registry;

pub use actioner::{ActionStatus, Actioner, Disposable};
pub use concurrency::{
    ConcurrencyMode, ConcurrencyPolicy, Emission, EmissionStream, EventStream, ExhaustPolicy,
    Finder, InvocationStream, LatestPolicy, MergePolicy, SequentialPolicy,
};
pub use controller::{Controller, EventHandler};
pub use registry::InvocationRegistry;
