//! # Resilience Module
//!
//! Fault tolerance for calls to partner services: circuit breakers, retry with
//! backoff, fallbacks and feature-level graceful degradation.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Isolate a failing dependency and fail fast while it recovers
//! - **Registry**: Lazily creates one breaker per dependency name from configuration
//! - **Retry Policy**: Exponential backoff with optional jitter
//! - **Fallbacks**: Degraded responses when a dependency cannot be reached
//! - **Resilient Service**: Breaker, retry and fallback composed around one dependency
//! - **Degradation Manager**: Switches whole features to a degraded path on dependency health
//!
//! ## Usage
//!
//! ```rust,no_run
//! use concierge_resilience::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     recovery_timeout: Duration::from_secs(30),
//!     ..Default::default()
//! };
//!
//! let breaker = CircuitBreaker::new("restaurant_booking", config);
//!
//! let _table = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("table for two") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod degradation;
pub mod fallback;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod service;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use degradation::{degraded_impl, DegradedImpl, FeatureStatus, GracefulDegradationManager};
pub use fallback::{DegradedResponse, FallbackContext, FallbackFn, FallbackRegistry};
pub use metrics::{CircuitBreakerStats, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;
pub use retry::RetryPolicy;
pub use service::{BreakerAccounting, ResilientService, ServiceMetrics};
