//! # Fallback Registry
//!
//! Maps a service name to an async function that produces a degraded response
//! when the service cannot be reached. Looking up an unregistered name is an
//! error; a fallback that itself fails is absorbed into a [`DegradedResponse`].

use crate::error::{BoxError, FallbackError};
use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Information handed to a fallback
#[derive(Debug, Clone, Serialize)]
pub struct FallbackContext {
    /// Service whose primary path failed
    pub service: String,

    /// Message of the primary failure, if there was one
    pub error: Option<String>,

    /// Breaker state when the primary path gave up
    pub circuit_state: Option<CircuitState>,

    /// When the fallback was requested
    pub timestamp: DateTime<Utc>,
}

impl FallbackContext {
    /// Create a new fallback context
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            error: None,
            circuit_state: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the primary failure message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the breaker state
    pub fn with_circuit_state(mut self, state: CircuitState) -> Self {
        self.circuit_state = Some(state);
        self
    }
}

/// Generic response returned when a fallback fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedResponse {
    /// Always `"service_unavailable"`
    pub error: String,
    pub message: String,
    /// Always true
    pub fallback: bool,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

impl DegradedResponse {
    pub const ERROR_CODE: &'static str = "service_unavailable";

    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Self::ERROR_CODE.to_string(),
            message: message.into(),
            fallback: true,
            timestamp: Utc::now(),
            service: service.into(),
        }
    }
}

impl From<DegradedResponse> for serde_json::Value {
    fn from(response: DegradedResponse) -> Self {
        serde_json::json!({
            "error": response.error,
            "message": response.message,
            "fallback": response.fallback,
            "timestamp": response.timestamp.to_rfc3339(),
            "service": response.service,
        })
    }
}

/// Async fallback function
pub type FallbackFn<T> =
    Arc<dyn Fn(FallbackContext) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Service name → fallback function
pub struct FallbackRegistry<T = serde_json::Value> {
    fallbacks: DashMap<String, FallbackFn<T>>,
}

impl<T> fmt::Debug for FallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackRegistry")
            .field("services", &self.registered_services())
            .finish()
    }
}

impl<T> Default for FallbackRegistry<T> {
    fn default() -> Self {
        Self {
            fallbacks: DashMap::new(),
        }
    }
}

impl<T> FallbackRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fallback exists for `service`
    pub fn is_registered(&self, service: &str) -> bool {
        self.fallbacks.contains_key(service)
    }

    /// Names of all services with a fallback, sorted
    pub fn registered_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .fallbacks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        services.sort();
        services
    }
}

impl<T> FallbackRegistry<T>
where
    T: Send + 'static,
{
    /// Register a fallback; replaces any previous registration for `service`
    pub fn register<F, Fut>(&self, service: impl Into<String>, fallback: F)
    where
        F: Fn(FallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let service = service.into();
        let fallback: FallbackFn<T> = Arc::new(move |context| Box::pin(fallback(context)));

        if self.fallbacks.insert(service.clone(), fallback).is_some() {
            info!(service = %service, "Replaced fallback registration");
        } else {
            info!(service = %service, "Registered fallback");
        }
    }

    /// Register a fallback that always returns a clone of `value`
    pub fn register_static(&self, service: impl Into<String>, value: T)
    where
        T: Clone + Sync,
    {
        self.register(service, move |_context| {
            let value = value.clone();
            async move { Ok(value) }
        });
    }

    /// Run the fallback for `service`
    ///
    /// Fails only when nothing is registered. A failing fallback yields a
    /// [`DegradedResponse`] instead of an error.
    pub async fn invoke(&self, service: &str, context: FallbackContext) -> Result<T, FallbackError>
    where
        T: From<DegradedResponse>,
    {
        // Clone the function out so the map shard is not locked across the await
        let fallback = self
            .fallbacks
            .get(service)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FallbackError::NoFallbackRegistered {
                service: service.to_string(),
            })?;

        match fallback(context).await {
            Ok(value) => {
                info!(service = service, "Fallback response served");
                Ok(value)
            }
            Err(e) => {
                warn!(
                    service = service,
                    error = %e,
                    "Fallback failed, returning degraded response"
                );
                Ok(T::from(DegradedResponse::new(
                    service,
                    format!("Service '{service}' is temporarily unavailable"),
                )))
            }
        }
    }
}
