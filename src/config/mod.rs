//! # Resilience Configuration System
//!
//! YAML-based configuration for circuit breakers, retry policies and per-service
//! overrides, with `development`/`test`/`production` sections merged over the
//! base document.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use concierge_resilience::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let _weather = manager.config().circuit_breakers.breaker_config_for("weather");
//! let _retry = manager.config().retry_policy_for("weather");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::resilience::{BreakerAccounting, CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Environments that may carry override sections in the configuration file
pub const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResilienceConfig {
    /// Environment the configuration was resolved for
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Circuit breaker settings
    pub circuit_breakers: CircuitBreakerSettings,

    /// Default retry settings for every service
    pub retry: RetrySettings,

    /// Per-service overrides
    #[serde(default)]
    pub services: HashMap<String, ServiceSettings>,
}

fn default_environment() -> String {
    "development".to_string()
}

/// Circuit breaker configuration from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerSettings {
    /// Whether circuit breakers may open at all
    pub enabled: bool,

    /// Global circuit breaker settings
    pub global_settings: CircuitBreakerGlobalSettings,

    /// Default configuration for new circuit breakers
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named components
    #[serde(default)]
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

/// Global circuit breaker settings from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerGlobalSettings {
    /// Soft limit on the number of breakers; exceeding it logs a warning
    pub max_circuit_breakers: usize,

    /// Response-time samples kept per breaker
    pub response_time_window: usize,
}

/// Per-component circuit breaker configuration from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerComponentConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Seconds since the last failure before an open circuit admits a probe
    pub recovery_timeout_seconds: f64,

    /// Number of successful calls in half-open state to close circuit
    pub success_threshold: u32,

    /// Upper bound on a single call in seconds
    pub call_timeout_seconds: f64,
}

/// Retry configuration from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub backoff_factor: f64,
    pub jitter: bool,

    /// How retried attempts are counted against the breaker
    #[serde(default)]
    pub accounting: BreakerAccounting,
}

/// Per-service overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServiceSettings {
    /// Retry settings replacing the defaults for this service
    #[serde(default)]
    pub retry: Option<RetrySettings>,
}

/// Seconds from YAML to `Duration`; negative or non-finite values become zero and fail validation
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl CircuitBreakerSettings {
    /// Get configuration for a specific component
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Runtime breaker configuration for a component, with global settings applied
    pub fn breaker_config_for(&self, component_name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: self.enabled,
            response_time_window: self.global_settings.response_time_window,
            ..self.config_for_component(component_name).to_resilience_config()
        }
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: seconds(self.recovery_timeout_seconds),
            success_threshold: self.success_threshold,
            call_timeout: seconds(self.call_timeout_seconds),
            ..Default::default()
        }
    }
}

impl RetrySettings {
    /// Convert to resilience module's format
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: seconds(self.base_delay_seconds),
            max_delay: seconds(self.max_delay_seconds),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }

    fn validate(&self, field: &str) -> ConfigResult<()> {
        if self.base_delay_seconds < 0.0 || !self.base_delay_seconds.is_finite() {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.base_delay_seconds"),
                self.base_delay_seconds.to_string(),
                "base delay must be a non-negative number of seconds",
            ));
        }

        self.to_retry_policy()
            .validate()
            .map_err(|e| ConfigurationError::invalid_value(field, format!("{self:?}"), e))
    }
}

impl ResilienceConfig {
    /// Retry settings for a service: its override if present, the defaults otherwise
    pub fn retry_settings_for(&self, service_name: &str) -> &RetrySettings {
        self.services
            .get(service_name)
            .and_then(|service| service.retry.as_ref())
            .unwrap_or(&self.retry)
    }

    /// Retry policy for a service
    pub fn retry_policy_for(&self, service_name: &str) -> RetryPolicy {
        self.retry_settings_for(service_name).to_retry_policy()
    }

    /// Breaker accounting mode for a service
    pub fn accounting_for(&self, service_name: &str) -> BreakerAccounting {
        self.retry_settings_for(service_name).accounting
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "environment",
                "resilience configuration",
            ));
        }

        if self.circuit_breakers.global_settings.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.global_settings.max_circuit_breakers",
                "0",
                "limit must be greater than 0",
            ));
        }

        let window = self.circuit_breakers.global_settings.response_time_window;
        let check_breaker = |field: String, component: &CircuitBreakerComponentConfig| {
            CircuitBreakerConfig {
                response_time_window: window,
                ..component.to_resilience_config()
            }
            .validate()
            .map_err(|e| ConfigurationError::invalid_value(field, format!("{component:?}"), e))
        };

        check_breaker(
            "circuit_breakers.default_config".to_string(),
            &self.circuit_breakers.default_config,
        )?;
        for (name, component) in &self.circuit_breakers.component_configs {
            check_breaker(
                format!("circuit_breakers.component_configs.{name}"),
                component,
            )?;
        }

        self.retry.validate("retry")?;
        for (name, service) in &self.services {
            if let Some(retry) = &service.retry {
                retry.validate(&format!("services.{name}.retry"))?;
            }
        }

        Ok(())
    }
}

impl Default for ResilienceConfig {
    /// Safe configuration with partner-specific breaker presets
    fn default() -> Self {
        let component = |config: CircuitBreakerConfig| CircuitBreakerComponentConfig {
            failure_threshold: config.failure_threshold,
            recovery_timeout_seconds: config.recovery_timeout.as_secs_f64(),
            success_threshold: config.success_threshold,
            call_timeout_seconds: config.call_timeout.as_secs_f64(),
        };

        let mut component_configs = HashMap::new();
        component_configs.insert(
            "ai_service".to_string(),
            component(CircuitBreakerConfig::for_ai_service()),
        );
        component_configs.insert("maps".to_string(), component(CircuitBreakerConfig::for_maps()));
        component_configs.insert(
            "weather".to_string(),
            component(CircuitBreakerConfig::for_weather()),
        );
        component_configs.insert(
            "booking_partner".to_string(),
            component(CircuitBreakerConfig::for_booking_partner()),
        );

        Self {
            environment: default_environment(),
            circuit_breakers: CircuitBreakerSettings {
                enabled: true,
                global_settings: CircuitBreakerGlobalSettings {
                    max_circuit_breakers: 50,
                    response_time_window: crate::resilience::config::DEFAULT_RESPONSE_TIME_WINDOW,
                },
                default_config: component(CircuitBreakerConfig::default()),
                component_configs,
            },
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_seconds: 1.0,
                max_delay_seconds: 60.0,
                backoff_factor: 2.0,
                jitter: true,
                accounting: BreakerAccounting::default(),
            },
            services: HashMap::new(),
        }
    }
}
