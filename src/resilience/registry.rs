//! # Circuit Breaker Registry
//!
//! Owns one circuit breaker per dependency name. Breakers are created lazily
//! from configuration on first reference and live for the rest of the process;
//! they are reset, never removed.

use crate::config::CircuitBreakerSettings;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    SystemCircuitBreakerMetrics,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Registry of circuit breakers across partner integrations
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    /// Collection of circuit breakers by component name
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    /// Configuration
    config: Arc<CircuitBreakerSettings>,
}

impl CircuitBreakerRegistry {
    /// Create a registry from circuit breaker settings
    pub fn from_config(config: &CircuitBreakerSettings) -> Self {
        info!(
            enabled = config.enabled,
            max_circuit_breakers = config.global_settings.max_circuit_breakers,
            component_configs = config.component_configs.len(),
            "Initializing circuit breaker registry"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config.clone()),
        }
    }

    /// Settings new breakers are created from
    pub fn settings(&self) -> &CircuitBreakerSettings {
        &self.config
    }

    /// Get or create circuit breaker for a component
    pub async fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(component_name, || {
            self.config.breaker_config_for(component_name)
        })
        .await
    }

    /// Get or create a breaker, building its configuration only if it does not exist yet
    ///
    /// An existing breaker keeps its original configuration.
    pub async fn get_or_create_with<C>(&self, component_name: &str, make_config: C) -> Arc<CircuitBreaker>
    where
        C: FnOnce() -> CircuitBreakerConfig,
    {
        // Try to get existing circuit breaker
        {
            let breakers = self.circuit_breakers.read().await;
            if let Some(breaker) = breakers.get(component_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write().await;

        // Double-check pattern (another task might have created it)
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        if breakers.len() >= self.config.global_settings.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count = breakers.len(),
                max_allowed = self.config.global_settings.max_circuit_breakers,
                "Circuit breaker limit exceeded, creating anyway"
            );
        }

        let breaker = Arc::new(CircuitBreaker::new(component_name, make_config()));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get an existing breaker without creating one
    pub async fn get(&self, component_name: &str) -> Option<Arc<CircuitBreaker>> {
        let breakers = self.circuit_breakers.read().await;
        breakers.get(component_name).cloned()
    }

    /// Get all circuit breaker names, sorted
    pub async fn list_components(&self) -> Vec<String> {
        let breakers = self.circuit_breakers.read().await;
        let mut names: Vec<String> = breakers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of breakers created so far
    pub async fn len(&self) -> usize {
        self.circuit_breakers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.circuit_breakers.read().await.is_empty()
    }

    /// Get stats for a specific circuit breaker
    pub async fn get_component_stats(&self, component_name: &str) -> Option<CircuitBreakerStats> {
        let breakers = self.circuit_breakers.read().await;
        breakers.get(component_name).map(|breaker| breaker.stats())
    }

    /// Get system-wide circuit breaker metrics
    pub async fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            system_metrics.add_circuit_breaker(breaker.stats());
        }

        system_metrics
    }

    /// Get count of circuit breakers by state
    pub async fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().await.count_by_state()
    }

    /// Names of breakers that are currently open
    pub async fn open_circuits(&self) -> Vec<String> {
        self.get_system_metrics().await.open_circuits()
    }

    /// Check overall system health based on circuit breaker states
    pub async fn system_health_score(&self) -> f64 {
        self.get_system_metrics().await.health_score()
    }

    /// Reset one breaker; returns false if it does not exist
    pub async fn reset(&self, component_name: &str) -> bool {
        match self.get(component_name).await {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker to closed (operator recovery)
    pub async fn reset_all(&self) {
        let breakers = self.circuit_breakers.read().await;

        let mut before = SystemCircuitBreakerMetrics::new();
        for breaker in breakers.values() {
            before.add_circuit_breaker(breaker.stats());
        }
        warn!(
            summary = %before.format_summary(),
            "Resetting all circuit breakers"
        );

        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::from_config(&crate::config::ResilienceConfig::default().circuit_breakers)
    }
}
