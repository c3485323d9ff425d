//! Proptest strategies for state sequences

use proptest::prelude::*;

/// Short candidate sequences over a small domain so repeats are common
pub fn candidate_sequence_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0_i64..4, 0..48)
}

/// States the store is expected to publish for `candidates`
///
/// The first candidate always commits; each later one commits only if it
/// differs from the last committed value.
pub fn expected_commits(candidates: &[i64]) -> Vec<i64> {
    let mut committed: Vec<i64> = Vec::new();
    for candidate in candidates {
        if committed.last() != Some(candidate) {
            committed.push(*candidate);
        }
    }
    committed
}
