//! # Resilient Service
//!
//! Composes a circuit breaker, a retry policy and the shared fallback registry
//! around one partner dependency.
//!
//! How retried attempts count against the breaker is chosen per service with
//! [`BreakerAccounting`]:
//!
//! - `PerCall` (default): the breaker is consulted once per logical call. Retries
//!   happen inside that single permit, each attempt bounded by `call_timeout`,
//!   and the breaker sees one success or one failure. Transient errors that a
//!   retry absorbs never move the breaker toward opening.
//! - `PerAttempt`: every attempt goes through the breaker and applies its own
//!   delta. Retrying stops as soon as the breaker rejects an attempt.

use crate::error::CallError;
use crate::resilience::{
    CircuitBreaker, CircuitState, DegradedResponse, FallbackContext, FallbackRegistry,
    RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How retried attempts are counted against the breaker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerAccounting {
    /// One breaker delta per logical call
    #[default]
    PerCall,
    /// One breaker delta per retry attempt
    PerAttempt,
}

/// Call counters for one service
#[derive(Debug, Default)]
struct ServiceCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
}

/// Metrics snapshot for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub service_name: String,
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub fallback_count: u64,
    /// Percentage of calls whose primary path succeeded (0 to 100)
    pub success_rate: f64,
    pub circuit_breaker_state: CircuitState,
}

/// Breaker, retry policy and fallback around one dependency
pub struct ResilientService<T = serde_json::Value> {
    name: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    fallbacks: Arc<FallbackRegistry<T>>,
    accounting: BreakerAccounting,
    counters: ServiceCounters,
}

impl<T> fmt::Debug for ResilientService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientService")
            .field("name", &self.name)
            .field("breaker", &self.breaker.name())
            .field("retry", &self.retry)
            .field("accounting", &self.accounting)
            .finish()
    }
}

impl<T> ResilientService<T>
where
    T: Send + 'static,
{
    /// Create a service with per-call accounting
    pub fn new(
        name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        fallbacks: Arc<FallbackRegistry<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            breaker,
            retry,
            fallbacks,
            accounting: BreakerAccounting::default(),
            counters: ServiceCounters::default(),
        }
    }

    /// Choose how retried attempts count against the breaker
    pub fn with_accounting(mut self, accounting: BreakerAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    /// Dependency name, also the fallback registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker guarding this dependency
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Retry policy applied to each logical call
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// How retried attempts count against the breaker
    pub fn accounting(&self) -> BreakerAccounting {
        self.accounting
    }

    /// Call the dependency through breaker and retry, falling back on failure
    ///
    /// When the primary path fails and a fallback is registered under this
    /// service's name, the fallback's value is returned. Without a fallback the
    /// primary failure is returned as is.
    pub async fn call<F, Fut, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        T: From<DegradedResponse>,
    {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        let result = match self.accounting {
            BreakerAccounting::PerCall => self.call_per_call(operation).await,
            BreakerAccounting::PerAttempt => self.call_per_attempt(operation).await,
        };

        let error = match result {
            Ok(value) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Err(error) => error,
        };

        self.counters.failures.fetch_add(1, Ordering::Relaxed);

        let context = FallbackContext::new(&self.name)
            .with_error(error.to_string())
            .with_circuit_state(self.breaker.state());

        match self.fallbacks.invoke(&self.name, context).await {
            Ok(value) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                info!(
                    service = %self.name,
                    error = %error,
                    "Primary path failed, served fallback"
                );
                Ok(value)
            }
            Err(fallback_error) => {
                warn!(
                    service = %self.name,
                    error = %error,
                    fallback_error = %fallback_error,
                    "Primary path failed with no fallback available"
                );
                Err(error)
            }
        }
    }

    /// One permit for the whole logical call; retries run inside it
    async fn call_per_call<F, Fut, E>(&self, mut operation: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker.as_ref();
        let timeout = breaker.config().call_timeout;

        let permit = breaker.try_acquire()?;
        let result = self
            .retry
            .execute(move || {
                let attempt = operation();
                breaker.run_bounded(timeout, attempt)
            })
            .await;

        debug!(
            service = %self.name,
            success = result.is_ok(),
            "Recording logical call outcome"
        );
        permit.record(&result);
        result
    }

    /// Every attempt passes through the breaker
    async fn call_per_attempt<F, Fut, E>(&self, mut operation: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker.as_ref();
        let timeout = breaker.config().call_timeout;

        self.retry
            .execute_if(
                move || {
                    let admitted = breaker
                        .try_acquire()
                        .map(|permit| (permit, operation()));

                    async move {
                        let (permit, attempt) = match admitted {
                            Ok(admitted) => admitted,
                            Err(open) => return Err(CallError::CircuitOpen(open)),
                        };
                        let result = breaker.run_bounded(timeout, attempt).await;
                        permit.record(&result);
                        result
                    }
                },
                |error: &CallError<E>| !error.is_circuit_open(),
            )
            .await
    }

    /// Get a metrics snapshot
    pub fn get_metrics(&self) -> ServiceMetrics {
        let call_count = self.counters.calls.load(Ordering::Relaxed);
        let success_count = self.counters.successes.load(Ordering::Relaxed);

        let success_rate = if call_count > 0 {
            success_count as f64 / call_count as f64 * 100.0
        } else {
            0.0
        };

        ServiceMetrics {
            service_name: self.name.clone(),
            call_count,
            success_count,
            failure_count: self.counters.failures.load(Ordering::Relaxed),
            fallback_count: self.counters.fallbacks.load(Ordering::Relaxed),
            success_rate,
            circuit_breaker_state: self.breaker.state(),
        }
    }
}
