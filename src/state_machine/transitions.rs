use serde::{Deserialize, Serialize};

/// One committed transition: the state before and after
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modify<S> {
    pub current: S,
    pub next: S,
}

impl<S> Modify<S> {
    pub fn new(current: S, next: S) -> Self {
        Self { current, next }
    }
}

/// A transition tagged with the event whose handler produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Progression<E, S> {
    pub current: S,
    pub event: E,
    pub next: S,
}

impl<E, S> Progression<E, S> {
    pub fn new(current: S, event: E, next: S) -> Self {
        Self {
            current,
            event,
            next,
        }
    }

    /// Drop the event annotation
    pub fn into_modify(self) -> Modify<S> {
        Modify::new(self.current, self.next)
    }
}
