use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::actioner::Actioner;
use crate::events::EngineState;

/// Set of live actioners, shared by every pipeline of an engine
///
/// Admission and closing are serialized: once [`close`](Self::close) returns,
/// every actioner admitted earlier is visible to [`snapshot`](Self::snapshot)
/// and no new actioner can be admitted.
pub struct InvocationRegistry<E, S> {
    live: DashMap<Uuid, Actioner<E, S>>,
    closed: RwLock<bool>,
}

impl<E, S: EngineState> InvocationRegistry<E, S> {
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            closed: RwLock::new(false),
        }
    }

    /// Track `actioner` as live. Returns `false` once the registry is closed.
    pub fn admit(&self, actioner: &Actioner<E, S>) -> bool {
        let closed = self.closed.read();
        if *closed {
            return false;
        }
        self.live.insert(actioner.id(), actioner.clone());
        true
    }

    pub fn release(&self, id: &Uuid) {
        self.live.remove(id);
    }

    /// Stop admitting new actioners
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Copy of every live actioner
    pub fn snapshot(&self) -> Vec<Actioner<E, S>> {
        self.live.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl<E, S: EngineState> Default for InvocationRegistry<E, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::state_machine::StateStore;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn actioner(store: &Arc<StateStore<(), i32>>) -> Actioner<(), i32> {
        let (output, _) = mpsc::unbounded_channel();
        Actioner::new(Arc::clone(store), output)
    }

    #[test]
    fn closed_registry_refuses_admission() {
        let store = Arc::new(StateStore::new(0, 8, Arc::new(NoopObserver)));
        let registry = InvocationRegistry::new();
        let first = actioner(&store);
        let second = actioner(&store);

        assert!(registry.admit(&first));
        registry.close();
        assert!(!registry.admit(&second));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), first.id());

        registry.release(&first.id());
        assert!(registry.is_empty());
        assert!(registry.is_closed());
    }
}
