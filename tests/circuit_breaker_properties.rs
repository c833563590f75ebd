mod common;

use common::strategies::*;
use concierge_resilience::resilience::{CircuitBreaker, CircuitState, RetryPolicy};
use proptest::prelude::*;
use std::time::Duration;

/// Recovery long enough that an open breaker never reaches half-open during a case
const NEVER_RECOVERS: Duration = Duration::from_secs(3600);

proptest! {
    /// Property: a closed breaker only opens once `failure_threshold` consecutive
    /// failures have been recorded, and rejects every call afterwards
    #[test]
    fn breaker_tracks_consecutive_failures(
        threshold in failure_threshold_strategy(),
        outcomes in outcome_sequence_strategy(),
    ) {
        let breaker = CircuitBreaker::new(
            "property",
            common::breaker_config(threshold, NEVER_RECOVERS, 1),
        );

        let mut consecutive = 0u32;
        let mut open = false;
        let mut rejections = 0u64;

        for outcome in &outcomes {
            match breaker.try_acquire() {
                Ok(permit) => {
                    prop_assert!(!open, "open breaker admitted a call");
                    match outcome {
                        Outcome::Success => {
                            permit.record_success();
                            consecutive = 0;
                        }
                        Outcome::Failure => {
                            permit.record_failure();
                            consecutive += 1;
                        }
                        Outcome::Timeout => {
                            permit.record_timeout();
                            consecutive += 1;
                        }
                    }
                    if consecutive >= threshold {
                        open = true;
                    }
                }
                Err(rejected) => {
                    prop_assert!(open, "closed breaker rejected a call");
                    prop_assert_eq!(rejected.state, CircuitState::Open);
                    prop_assert!(rejected.remaining_cooldown <= NEVER_RECOVERS);
                    rejections += 1;
                }
            }

            let stats = breaker.stats();
            let expected_state = if open { CircuitState::Open } else { CircuitState::Closed };
            prop_assert_eq!(stats.state, expected_state);
            prop_assert_eq!(stats.failure_count, consecutive);
        }

        let stats = breaker.stats();
        prop_assert_eq!(stats.total_calls, outcomes.len() as u64);
        prop_assert_eq!(stats.total_rejections, rejections);
        prop_assert_eq!(
            stats.total_successes + stats.total_failures + stats.total_rejections,
            outcomes.len() as u64
        );
    }

    /// Property: successes alone never move a breaker away from closed
    #[test]
    fn successes_keep_breaker_closed(threshold in failure_threshold_strategy(), calls in 0usize..100) {
        let breaker = CircuitBreaker::new(
            "property",
            common::breaker_config(threshold, NEVER_RECOVERS, 1),
        );

        for _ in 0..calls {
            let permit = breaker.try_acquire();
            prop_assert!(permit.is_ok());
            if let Ok(permit) = permit {
                permit.record_success();
            }
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            prop_assert_eq!(breaker.stats().failure_count, 0);
        }
    }

    /// Property: reset always yields a clean closed breaker
    #[test]
    fn reset_from_any_state(
        threshold in failure_threshold_strategy(),
        outcomes in outcome_sequence_strategy(),
    ) {
        let breaker = CircuitBreaker::new(
            "property",
            common::breaker_config(threshold, NEVER_RECOVERS, 1),
        );

        for outcome in outcomes {
            if let Ok(permit) = breaker.try_acquire() {
                match outcome {
                    Outcome::Success => permit.record_success(),
                    Outcome::Failure => permit.record_failure(),
                    Outcome::Timeout => permit.record_timeout(),
                }
            }
        }

        breaker.reset();
        let stats = breaker.stats();
        prop_assert_eq!(stats.state, CircuitState::Closed);
        prop_assert_eq!(stats.failure_count, 0);
        prop_assert_eq!(stats.success_count, 0);
        prop_assert!(stats.last_failure_time.is_none());
    }

    /// Property: backoff never decreases with the attempt number and never exceeds max_delay
    #[test]
    fn backoff_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        factor in 1.0f64..4.0,
        max_ms in 5_000u64..120_000,
    ) {
        let policy = RetryPolicy::new(10)
            .with_base_delay(Duration::from_millis(base_ms))
            .with_max_delay(Duration::from_millis(max_ms))
            .with_backoff_factor(factor)
            .with_jitter(false);

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.backoff_delay(attempt);
            prop_assert!(delay >= previous, "attempt {} went from {:?} to {:?}", attempt, previous, delay);
            prop_assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    /// Property: jitter scales each delay into [0.5, 1.0] of the un-jittered value
    #[test]
    fn jitter_stays_in_range(attempt in 0u32..10) {
        let policy = RetryPolicy::default();
        let nominal = policy.backoff_delay(attempt);
        let jittered = policy.delay_for_attempt(attempt);

        prop_assert!(jittered <= nominal);
        prop_assert!(jittered >= nominal.mul_f64(0.5).saturating_sub(Duration::from_nanos(1)));
    }
}
