use proptest::prelude::*;

/// Outcome fed to a breaker through its permit API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

pub fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => Just(Outcome::Success),
        2 => Just(Outcome::Failure),
        1 => Just(Outcome::Timeout),
    ]
}

pub fn outcome_sequence_strategy() -> impl Strategy<Value = Vec<Outcome>> {
    prop::collection::vec(outcome_strategy(), 0..64)
}

pub fn failure_threshold_strategy() -> impl Strategy<Value = u32> {
    1u32..=10
}
