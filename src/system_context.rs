use crate::config::{ConfigManager, ResilienceConfig};
use crate::error::ResilienceResult;
use crate::resilience::{
    CircuitBreakerRegistry, FallbackRegistry, GracefulDegradationManager, ResilientService,
};
use std::sync::Arc;
use tracing::info;

/// Shared resilience dependencies for one process
///
/// Built once at startup and handed to request handlers. Holds:
/// - Configuration manager with environment-aware loading
/// - Circuit breaker registry
/// - Fallback registry shared by every service
/// - Feature degradation manager
pub struct ResilienceContext {
    /// Configuration manager with environment-aware loading
    pub config_manager: Arc<ConfigManager>,

    /// One breaker per partner dependency
    pub circuit_breakers: CircuitBreakerRegistry,

    /// Fallbacks keyed by service name
    pub fallbacks: Arc<FallbackRegistry>,

    /// Feature-level degradation
    pub degradation: Arc<GracefulDegradationManager>,
}

impl std::fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("environment", &self.config_manager.environment())
            .field("circuit_breakers", &"CircuitBreakerRegistry")
            .field("fallbacks", &self.fallbacks.registered_services())
            .field("degradation", &self.degradation)
            .finish()
    }
}

impl ResilienceContext {
    /// Create a context with environment-aware configuration loading
    pub fn new() -> ResilienceResult<Self> {
        let config_manager = ConfigManager::load()?;
        Ok(Self::from_config_manager(config_manager))
    }

    /// Create a context from an in-memory configuration
    pub fn from_config(config: ResilienceConfig) -> ResilienceResult<Self> {
        let config_manager = ConfigManager::from_config(config)?;
        Ok(Self::from_config_manager(config_manager))
    }

    /// Create a context from an already loaded configuration manager
    pub fn from_config_manager(config_manager: Arc<ConfigManager>) -> Self {
        info!(
            environment = config_manager.environment(),
            "Initializing resilience context"
        );

        let circuit_breakers =
            CircuitBreakerRegistry::from_config(&config_manager.config().circuit_breakers);

        Self {
            config_manager,
            circuit_breakers,
            fallbacks: Arc::new(FallbackRegistry::new()),
            degradation: Arc::new(GracefulDegradationManager::new()),
        }
    }

    /// Build a resilient service for a named dependency
    ///
    /// The breaker comes from the registry, so every service built for the
    /// same name shares it. Fallbacks come from the context's registry. Retry
    /// policy and accounting mode come from the service's configuration
    /// override, or the defaults.
    pub async fn service(&self, name: &str) -> ResilientService {
        self.service_with_fallbacks(name, Arc::clone(&self.fallbacks))
            .await
    }

    /// Build a resilient service that falls back through a typed registry
    pub async fn service_with_fallbacks<T>(
        &self,
        name: &str,
        fallbacks: Arc<FallbackRegistry<T>>,
    ) -> ResilientService<T>
    where
        T: Send + 'static,
    {
        let config = self.config_manager.config();
        let breaker = self.circuit_breakers.get_circuit_breaker(name).await;

        ResilientService::new(name, breaker, config.retry_policy_for(name), fallbacks)
            .with_accounting(config.accounting_for(name))
    }

    pub fn config(&self) -> &ResilienceConfig {
        self.config_manager.config()
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.circuit_breakers
    }

    pub fn fallbacks(&self) -> &Arc<FallbackRegistry> {
        &self.fallbacks
    }

    pub fn degradation(&self) -> &Arc<GracefulDegradationManager> {
        &self.degradation
    }

    /// Push current breaker state into the degradation manager
    pub async fn sync_feature_health(&self) {
        self.degradation
            .sync_with_registry(&self.circuit_breakers)
            .await;
    }
}
