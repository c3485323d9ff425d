mod common;

use common::strategies::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use transition_engine::{Actioner, NoopObserver, StateStore};

proptest! {
    /// Property: published commits are the candidates that differ from the last
    /// committed value, with the first candidate always committed
    #[test]
    fn store_publishes_only_changed_states(initial in 0_i64..4, candidates in candidate_sequence_strategy()) {
        let store: StateStore<(), i64> = StateStore::new(initial, 128, Arc::new(NoopObserver));
        let mut receiver = store.subscribe();

        for candidate in &candidates {
            prop_assert!(store.apply(*candidate).is_ok());
        }

        let mut published = Vec::new();
        while let Ok(state) = receiver.try_recv() {
            published.push(state);
        }

        let expected = expected_commits(&candidates);
        prop_assert_eq!(store.transitions_committed(), expected.len() as u64);
        prop_assert_eq!(store.current_state(), expected.last().copied().unwrap_or(initial));
        prop_assert_eq!(published, expected);
    }

    /// Property: cancelling runs every disposable exactly once, however often
    /// the actioner is cancelled or completed afterwards
    #[test]
    fn disposables_run_exactly_once(disposables in 0_usize..16, extra_cancels in 0_usize..4) {
        let store = Arc::new(StateStore::<(), i64>::new(0, 8, Arc::new(NoopObserver)));
        let (output, _receiver) = mpsc::unbounded_channel();
        let actioner = Actioner::new(store, output);
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..disposables {
            let runs = Arc::clone(&runs);
            actioner.add_disposable(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }

        actioner.cancel();
        for _ in 0..extra_cancels {
            actioner.cancel();
            prop_assert!(actioner.complete().is_ok());
        }

        prop_assert_eq!(runs.load(Ordering::SeqCst), disposables);
        prop_assert!(actioner.is_ended());
    }
}
