//! # Circuit Breaker Metrics
//!
//! Plain-data snapshots of circuit breaker state for health endpoints and logs.
//! Everything here is `serde`-serializable so the surrounding application can
//! expose it however it likes.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Breaker name
    pub name: String,

    /// Current state after the lazy recovery check
    pub state: CircuitState,

    /// Whether the breaker is allowed to open
    pub enabled: bool,

    /// Consecutive failures counted toward the threshold
    pub failure_count: u32,

    /// Successes counted while half-open
    pub success_count: u32,

    /// Wall-clock time of the most recent failure
    pub last_failure_time: Option<DateTime<Utc>>,

    /// Wall-clock time of the most recent state change
    pub last_state_change: DateTime<Utc>,

    /// Mean of the sampled response times of successful calls
    pub avg_response_time: Duration,

    /// Number of response-time samples held
    pub sample_count: usize,

    /// Calls that asked the breaker for permission, including rejected ones
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Failures caused by the call timeout (also counted in `total_failures`)
    pub total_timeouts: u64,
    pub total_rejections: u64,
}

impl CircuitBreakerStats {
    /// Fraction of completed calls that failed (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let completed = self.total_successes + self.total_failures;
        if completed == 0 {
            return 0.0;
        }
        self.total_failures as f64 / completed as f64
    }

    /// Check if the snapshot indicates healthy operation
    pub fn is_healthy(&self) -> bool {
        self.state != CircuitState::Open
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing system health",
        }
    }

    /// Format stats for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Rejected: {} | Failure rate: {:.1}% | Avg response: {}ms",
            self.state_description(),
            self.total_calls,
            self.total_failures,
            self.total_rejections,
            self.failure_rate() * 100.0,
            self.avg_response_time.as_millis()
        )
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Stats for individual circuit breakers by name
    pub circuit_breakers: HashMap<String, CircuitBreakerStats>,

    /// Timestamp of last metrics collection
    pub collected_at: DateTime<Utc>,
}

impl SystemCircuitBreakerMetrics {
    /// Create new system metrics
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: Utc::now(),
        }
    }

    /// Add stats for a circuit breaker
    pub fn add_circuit_breaker(&mut self, stats: CircuitBreakerStats) {
        self.circuit_breakers.insert(stats.name.clone(), stats);
        self.collected_at = Utc::now();
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();

        for stats in self.circuit_breakers.values() {
            *counts.entry(stats.state).or_insert(0) += 1;
        }

        counts
    }

    /// Names of breakers that are currently open, sorted
    pub fn open_circuits(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .values()
            .filter(|stats| stats.state == CircuitState::Open)
            .map(|stats| stats.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Get list of unhealthy circuit breakers
    pub fn unhealthy_circuits(&self) -> Vec<(&String, &CircuitBreakerStats)> {
        self.circuit_breakers
            .iter()
            .filter(|(_, stats)| !stats.is_healthy())
            .collect()
    }

    /// Calculate system-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0; // No circuit breakers = healthy
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|stats| stats.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    /// Get total calls across all circuit breakers
    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|s| s.total_calls).sum()
    }

    /// Get total failures across all circuit breakers
    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|s| s.total_failures).sum()
    }

    /// Get system-wide failure rate
    pub fn system_failure_rate(&self) -> f64 {
        let total_calls = self.total_calls();
        if total_calls == 0 {
            return 0.0;
        }

        self.total_failures() as f64 / total_calls as f64
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let closed_count = state_counts.get(&CircuitState::Closed).unwrap_or(&0);
        let open_count = state_counts.get(&CircuitState::Open).unwrap_or(&0);
        let half_open_count = state_counts.get(&CircuitState::HalfOpen).unwrap_or(&0);

        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | System failure rate: {:.2}%",
            self.circuit_breakers.len(),
            closed_count,
            open_count,
            half_open_count,
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
