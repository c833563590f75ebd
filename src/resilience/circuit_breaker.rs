//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for calls to partner services. This implementation
//! follows the classic circuit breaker pattern with three states:
//! Closed (normal operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! State and counters for one breaker live behind a single `parking_lot::Mutex`.
//! The lock is never held across an `.await`: a call takes a [`CallPermit`]
//! under the lock, runs the operation unlocked, then applies exactly one success
//! or failure delta under the lock again.
//!
//! The Open → Half-Open transition is lazy. It happens whenever the state is
//! read after `recovery_timeout` has elapsed since the last failure, not on a timer.

use crate::error::{CallError, CircuitOpenError};
use crate::resilience::metrics::CircuitBreakerStats;
use crate::resilience::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - one probe call at a time is allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Bounded window of recent response times
#[derive(Debug)]
struct ResponseTimeWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl ResponseTimeWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Lifetime counters; never reset by state transitions
#[derive(Debug, Default, Clone, Copy)]
struct LifetimeCounters {
    calls: u64,
    successes: u64,
    failures: u64,
    timeouts: u64,
    rejections: u64,
}

/// Everything guarded by the breaker's mutex
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_failure_at: Option<Instant>,
    last_state_change: DateTime<Utc>,
    probe_in_flight: bool,
    /// Bumped on every Open → Half-Open change and on reset
    half_open_generation: u64,
    response_times: ResponseTimeWindow,
    totals: LifetimeCounters,
}

impl BreakerState {
    fn new(window: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_failure_at: None,
            last_state_change: Utc::now(),
            probe_in_flight: false,
            half_open_generation: 0,
            response_times: ResponseTimeWindow::new(window),
            totals: LifetimeCounters::default(),
        }
    }

    fn since_last_failure(&self) -> Duration {
        self.last_failure_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX)
    }

    /// True when `slot` is the half-open slot of the current half-open period
    fn holds_current_slot(&self, slot: Option<u64>) -> bool {
        self.state == CircuitState::HalfOpen && slot == Some(self.half_open_generation)
    }

    fn record_failure_time(&mut self) {
        self.last_failure_time = Some(Utc::now());
        self.last_failure_at = Some(Instant::now());
    }
}

/// Kind of failure being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Error,
    Timeout,
}

/// Core circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State machine, counters and samples
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            call_timeout_ms = config.call_timeout.as_millis() as u64,
            enabled = config.enabled,
            "Circuit breaker initialized"
        );

        let inner = Mutex::new(BreakerState::new(config.response_time_window));
        Self {
            name,
            config,
            inner,
        }
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state, applying the lazy Open → Half-Open check
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Execute an operation bounded by the configured `call_timeout`
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_timeout(self.config.call_timeout, operation)
            .await
    }

    /// Execute an operation with circuit breaker protection and an explicit timeout
    ///
    /// Fails immediately with `CallError::CircuitOpen` while the breaker is open,
    /// without invoking `operation`. A timed-out operation is dropped, which
    /// cancels it, and counts as a failure.
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        timeout: Duration,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire()?;
        let result = self.run_bounded(timeout, operation()).await;
        permit.record(&result);
        result
    }

    /// Run a future under a timeout without touching breaker state
    pub(crate) async fn run_bounded<Fut, T, E>(
        &self,
        timeout: Duration,
        future: Fut,
    ) -> Result<T, CallError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CallError::Operation(e)),
            Err(_) => {
                warn!(
                    component = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Operation timed out"
                );
                Err(CallError::Timeout {
                    component: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Ask the breaker for permission to make one call
    ///
    /// The returned permit must be completed with exactly one of
    /// [`CallPermit::record_success`], [`CallPermit::record_failure`] or
    /// [`CallPermit::record_timeout`]. Dropping it unused applies no delta and
    /// releases the half-open probe slot if it held one.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.totals.calls += 1;

        if !self.config.enabled {
            return Ok(CallPermit::new(self, None));
        }

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, None)),
            CircuitState::Open => {
                inner.totals.rejections += 1;
                let remaining = self
                    .config
                    .recovery_timeout
                    .saturating_sub(inner.since_last_failure());
                debug!(
                    component = %self.name,
                    remaining_cooldown_ms = remaining.as_millis() as u64,
                    "Call rejected (circuit open)"
                );
                Err(CircuitOpenError {
                    name: self.name.clone(),
                    state: CircuitState::Open,
                    remaining_cooldown: remaining,
                })
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.totals.rejections += 1;
                    debug!(
                        component = %self.name,
                        "Call rejected (half-open probe in flight)"
                    );
                    return Err(CircuitOpenError {
                        name: self.name.clone(),
                        state: CircuitState::HalfOpen,
                        remaining_cooldown: Duration::ZERO,
                    });
                }
                inner.probe_in_flight = true;
                Ok(CallPermit::new(self, Some(inner.half_open_generation)))
            }
        }
    }

    /// Get a snapshot of state, counters and response times
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            enabled: self.config.enabled,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            last_state_change: inner.last_state_change,
            avg_response_time: inner.response_times.average(),
            sample_count: inner.response_times.len(),
            total_calls: inner.totals.calls,
            total_successes: inner.totals.successes,
            total_failures: inner.totals.failures,
            total_timeouts: inner.totals.timeouts,
            total_rejections: inner.totals.rejections,
        }
    }

    /// Force the breaker closed, clearing counters, failure time and samples
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_time = None;
        inner.last_failure_at = None;
        inner.last_state_change = Utc::now();
        inner.probe_in_flight = false;
        inner.half_open_generation += 1;
        inner.response_times.clear();

        warn!(
            component = %self.name,
            previous_state = %previous,
            "Circuit breaker manually reset"
        );
    }

    /// Check if circuit is healthy (closed or testing recovery)
    pub fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Lazy Open → Half-Open check
    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open
            && inner.since_last_failure() > self.config.recovery_timeout
        {
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            inner.probe_in_flight = false;
            inner.half_open_generation += 1;
            inner.last_state_change = Utc::now();

            info!(
                component = %self.name,
                success_threshold = self.config.success_threshold,
                "Circuit breaker half-open (testing recovery)"
            );
        }
    }

    fn on_success(&self, slot: Option<u64>, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.totals.successes += 1;
        inner.response_times.record(elapsed);
        let current = inner.holds_current_slot(slot);
        if current {
            inner.probe_in_flight = false;
        }

        debug!(
            component = %self.name,
            duration_ms = elapsed.as_millis() as u64,
            "Operation succeeded"
        );

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen if current => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition_to_closed(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // Admitted before this half-open period began
                debug!(component = %self.name, "Stale success ignored while half-open");
            }
            CircuitState::Open => {
                // Late success from a call admitted before the breaker opened
                debug!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn on_failure(&self, slot: Option<u64>, kind: FailureKind, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.totals.failures += 1;
        if kind == FailureKind::Timeout {
            inner.totals.timeouts += 1;
        }
        if inner.holds_current_slot(slot) {
            inner.probe_in_flight = false;
        }
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.record_failure_time();

        error!(
            component = %self.name,
            duration_ms = elapsed.as_millis() as u64,
            timed_out = kind == FailureKind::Timeout,
            failure_count = inner.failure_count,
            "Operation failed"
        );

        if !self.config.enabled {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition_to_open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately opens circuit
                self.transition_to_open(&mut inner);
            }
            CircuitState::Open => {
                // Already open; the refreshed failure time extends the cooldown
            }
        }
    }

    /// Release a half-open slot without recording an outcome
    fn release_probe(&self, slot: Option<u64>) {
        let mut inner = self.inner.lock();
        if inner.holds_current_slot(slot) {
            inner.probe_in_flight = false;
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.probe_in_flight = false;
        inner.last_state_change = Utc::now();

        info!(
            component = %self.name,
            total_calls = inner.totals.calls,
            "Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.probe_in_flight = false;
        inner.last_state_change = Utc::now();

        error!(
            component = %self.name,
            failure_count = inner.failure_count,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
            "Circuit breaker opened (failing fast)"
        );
    }
}

/// Permission to make one call through a breaker
///
/// Obtained from [`CircuitBreaker::try_acquire`]. Usable from synchronous code;
/// the async `execute` methods are built on it.
#[derive(Debug)]
#[must_use = "a permit must be completed with a success or failure"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// Half-open generation when this permit holds the half-open slot
    slot: Option<u64>,
    started: Instant,
    completed: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, slot: Option<u64>) -> Self {
        Self {
            breaker,
            slot,
            started: Instant::now(),
            completed: false,
        }
    }

    /// True when this permit is the single half-open probe
    pub fn is_probe(&self) -> bool {
        self.slot.is_some()
    }

    /// Record a successful call
    pub fn record_success(mut self) {
        self.completed = true;
        self.breaker
            .on_success(self.slot, self.started.elapsed());
    }

    /// Record a failed call
    pub fn record_failure(mut self) {
        self.completed = true;
        self.breaker
            .on_failure(self.slot, FailureKind::Error, self.started.elapsed());
    }

    /// Record a call that exceeded its timeout
    pub fn record_timeout(mut self) {
        self.completed = true;
        self.breaker
            .on_failure(self.slot, FailureKind::Timeout, self.started.elapsed());
    }

    /// Record the outcome of a guarded call
    ///
    /// A `CircuitOpen` outcome applies no delta.
    pub fn record<T, E>(self, result: &Result<T, CallError<E>>) {
        match result {
            Ok(_) => self.record_success(),
            Err(CallError::Timeout { .. }) => self.record_timeout(),
            Err(CallError::Operation(_)) => self.record_failure(),
            Err(CallError::CircuitOpen(_)) => drop(self),
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.completed && self.slot.is_some() {
            self.breaker.release_probe(self.slot);
        }
    }
}
