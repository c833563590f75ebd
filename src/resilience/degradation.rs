//! # Graceful Degradation
//!
//! Feature-level health derived from dependency health. Callers push service
//! health with [`GracefulDegradationManager::set_service_health`]; a feature is
//! disabled while any of its dependencies is unhealthy and runs its degraded
//! implementation instead of the primary path.
//!
//! This health model is coarser than the circuit breaker and independent of
//! it. [`GracefulDegradationManager::sync_with_registry`] bridges the two when
//! a caller wants breaker state to drive feature health.

use crate::error::{BoxError, FeatureError};
use crate::resilience::{CircuitBreakerRegistry, CircuitState};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Async degraded implementation of a feature
pub type DegradedImpl<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Wrap an async closure as a [`DegradedImpl`]
pub fn degraded_impl<T, F, Fut>(f: F) -> DegradedImpl<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

struct FeatureState<T> {
    enabled: bool,
    dependencies: BTreeSet<String>,
    degraded: Option<DegradedImpl<T>>,
    last_check: DateTime<Utc>,
}

/// Plain-data view of one feature for health endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub enabled: bool,
    pub dependencies: Vec<String>,
    pub has_degraded_implementation: bool,
    pub last_check: DateTime<Utc>,
}

struct DegradationState<T> {
    features: HashMap<String, FeatureState<T>>,
    unhealthy_services: HashSet<String>,
}

/// Switches features between primary and degraded paths based on service health
pub struct GracefulDegradationManager<T = serde_json::Value> {
    state: RwLock<DegradationState<T>>,
}

impl<T> fmt::Debug for GracefulDegradationManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("GracefulDegradationManager")
            .field("features", &state.features.len())
            .field("unhealthy_services", &state.unhealthy_services)
            .finish()
    }
}

impl<T> Default for GracefulDegradationManager<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(DegradationState {
                features: HashMap::new(),
                unhealthy_services: HashSet::new(),
            }),
        }
    }
}

impl<T> GracefulDegradationManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a feature, its dependencies and an optional degraded path
    ///
    /// Re-registering a feature replaces it. A feature starts disabled if any
    /// of its dependencies is already known to be unhealthy.
    pub fn register_feature<I, S>(
        &self,
        name: impl Into<String>,
        dependencies: I,
        degraded: Option<DegradedImpl<T>>,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let dependencies: BTreeSet<String> = dependencies.into_iter().map(Into::into).collect();

        let mut state = self.state.write();
        let enabled = dependencies
            .iter()
            .all(|dependency| !state.unhealthy_services.contains(dependency));

        info!(
            feature = %name,
            dependencies = ?dependencies,
            has_degraded_implementation = degraded.is_some(),
            enabled = enabled,
            "Registered feature"
        );

        state.features.insert(
            name,
            FeatureState {
                enabled,
                dependencies,
                degraded,
                last_check: Utc::now(),
            },
        );
    }

    /// Record a service's health and propagate it to dependent features
    ///
    /// An unhealthy service disables every enabled feature depending on it. A
    /// healthy service re-enables a disabled feature once none of its other
    /// dependencies is still unhealthy.
    pub fn set_service_health(&self, service: &str, healthy: bool) {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if healthy {
            state.unhealthy_services.remove(service);
        } else {
            state.unhealthy_services.insert(service.to_string());
        }

        let now = Utc::now();
        for (name, feature) in state.features.iter_mut() {
            if !feature.dependencies.contains(service) {
                continue;
            }
            feature.last_check = now;

            if !healthy && feature.enabled {
                feature.enabled = false;
                warn!(feature = %name, service = service, "Feature degraded (dependency unhealthy)");
            } else if healthy && !feature.enabled {
                let all_healthy = feature
                    .dependencies
                    .iter()
                    .all(|dependency| !state.unhealthy_services.contains(dependency));

                if all_healthy {
                    feature.enabled = true;
                    info!(feature = %name, service = service, "Feature restored");
                } else {
                    debug!(
                        feature = %name,
                        service = service,
                        "Dependency recovered but feature still has unhealthy dependencies"
                    );
                }
            }
        }
    }

    /// Whether a feature is enabled; `None` if it is not registered
    pub fn is_feature_enabled(&self, name: &str) -> Option<bool> {
        self.state.read().features.get(name).map(|f| f.enabled)
    }

    /// Services currently reported unhealthy, sorted
    pub fn unhealthy_services(&self) -> Vec<String> {
        let mut services: Vec<String> =
            self.state.read().unhealthy_services.iter().cloned().collect();
        services.sort();
        services
    }

    /// Per-feature status for health endpoints
    pub fn get_feature_status(&self) -> HashMap<String, FeatureStatus> {
        self.state
            .read()
            .features
            .iter()
            .map(|(name, feature)| {
                (
                    name.clone(),
                    FeatureStatus {
                        enabled: feature.enabled,
                        dependencies: feature.dependencies.iter().cloned().collect(),
                        has_degraded_implementation: feature.degraded.is_some(),
                        last_check: feature.last_check,
                    },
                )
            })
            .collect()
    }

    /// Run a feature through its primary or degraded path
    ///
    /// - Unregistered: `primary` runs directly and its error is `FeatureError::Primary`.
    /// - Enabled: `primary` runs; on failure the degraded path runs if there is one.
    /// - Disabled: `primary` is skipped and the degraded path runs.
    ///
    /// With no degraded path to take, the result is `FeatureError::Unavailable`.
    pub async fn execute_feature<F, Fut, E>(&self, name: &str, primary: F) -> Result<T, FeatureError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Copy what we need out of the lock before awaiting anything
        let snapshot = {
            let state = self.state.read();
            state
                .features
                .get(name)
                .map(|feature| (feature.enabled, feature.degraded.clone()))
        };

        let Some((enabled, degraded)) = snapshot else {
            return primary().await.map_err(FeatureError::Primary);
        };

        let cause = if enabled {
            match primary().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(feature = name, "Primary path failed");
                    Some(e)
                }
            }
        } else {
            debug!(feature = name, "Feature disabled, skipping primary path");
            None
        };

        match degraded {
            Some(degraded) => {
                info!(feature = name, "Running degraded implementation");
                degraded().await.map_err(|error| FeatureError::Degraded {
                    feature: name.to_string(),
                    error,
                })
            }
            None => {
                warn!(feature = name, "Feature unavailable (no degraded implementation)");
                Err(FeatureError::Unavailable {
                    feature: name.to_string(),
                    cause,
                })
            }
        }
    }

    /// Push circuit breaker state into service health
    ///
    /// Every breaker in the registry reports its service as unhealthy while
    /// open and healthy otherwise.
    pub async fn sync_with_registry(&self, registry: &CircuitBreakerRegistry) {
        let metrics = registry.get_system_metrics().await;
        for (service, stats) in &metrics.circuit_breakers {
            self.set_service_health(service, stats.state != CircuitState::Open);
        }
    }
}
