//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker, expressed in `Duration`s.
//!
//! **Note**: For file-based configuration use `crate::config::CircuitBreakerSettings`,
//! which is deserialized from YAML and converted into this type per component.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of the response-time sample window
pub const DEFAULT_RESPONSE_TIME_WINDOW: usize = 100;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure before an open circuit admits a probe call
    pub recovery_timeout: Duration,

    /// Number of successful calls in half-open state to close circuit
    pub success_threshold: u32,

    /// Upper bound on a single guarded call
    pub call_timeout: Duration,

    /// When false the breaker never opens, but still enforces `call_timeout`
    pub enabled: bool,

    /// Capacity of the response-time ring buffer
    pub response_time_window: usize,
}

impl CircuitBreakerConfig {
    /// Configuration for AI/LLM providers (slow calls, expensive retries)
    pub fn for_ai_service() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            call_timeout: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Configuration for maps and places lookups
    pub fn for_maps() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Configuration for weather providers
    pub fn for_weather() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(120),
            success_threshold: 2,
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Configuration for booking partners (reservations, tickets, tours)
    pub fn for_booking_partner() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: Duration::from_secs(15),
            ..Default::default()
        }
    }

    /// A configuration that never trips
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(3600) {
            return Err("recovery_timeout should not exceed 3600 seconds".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        if self.call_timeout.is_zero() {
            return Err("call_timeout must be greater than 0".to_string());
        }

        if self.response_time_window == 0 {
            return Err("response_time_window must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            call_timeout: Duration::from_secs(30),
            enabled: true,
            response_time_window: DEFAULT_RESPONSE_TIME_WINDOW,
        }
    }
}
