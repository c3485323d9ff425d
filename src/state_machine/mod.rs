// State machine module for the transition engine
//
// Transition records and the authoritative state store that commits and
// publishes them.

pub mod store;
pub mod transitions;

pub use store::StateStore;
pub use transitions::{Modify, Progression};
