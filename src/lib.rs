#![allow(clippy::doc_markdown)] // Allow technical terms like YAML, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Concierge Resilience
//!
//! Fault tolerance for the travel concierge backend's calls to partner
//! services: AI generation, maps, weather, booking partners and the rest.
//!
//! ## Overview
//!
//! Every outbound call goes through a circuit breaker that fails fast while a
//! partner is down, a retry policy with exponential backoff, and a fallback
//! registry that serves a degraded response instead of an error. Above the
//! per-call layer, a degradation manager turns whole features off while their
//! dependencies are unhealthy and routes them to degraded implementations.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breakers, retry, fallbacks, resilient services and degradation
//! - [`config`] - Environment-aware YAML configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`system_context`] - Process-wide wiring of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use concierge_resilience::config::ResilienceConfig;
//! use concierge_resilience::ResilienceContext;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = ResilienceContext::from_config(ResilienceConfig::default())?;
//!
//! context
//!     .fallbacks()
//!     .register_static("weather", json!({ "forecast": "unavailable" }));
//!
//! let weather = context.service("weather").await;
//! let forecast = weather
//!     .call(|| async { Ok::<_, std::io::Error>(json!({ "forecast": "sunny" })) })
//!     .await?;
//!
//! println!("{forecast}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod resilience;
pub mod system_context;

pub use config::{ConfigManager, ConfigurationError, ResilienceConfig};
pub use error::{
    BoxError, CallError, CircuitOpenError, FallbackError, FeatureError, ResilienceError,
    ResilienceResult,
};
pub use resilience::{
    BreakerAccounting, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitState, FallbackRegistry, GracefulDegradationManager, ResilientService, RetryPolicy,
};
pub use system_context::ResilienceContext;
