#![allow(dead_code)]

pub mod strategies;

use concierge_resilience::resilience::CircuitBreakerConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Install a test subscriber; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn breaker_config(
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout,
        success_threshold,
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Stub partner call that counts invocations
#[derive(Debug, Clone, Default)]
pub struct PartnerStub {
    invocations: Arc<AtomicU32>,
}

impl PartnerStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub async fn fail(&self, message: &'static str) -> Result<serde_json::Value, &'static str> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(message)
    }

    pub async fn succeed(&self) -> Result<serde_json::Value, &'static str> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "status": "ok" }))
    }

    /// Fail the first `failures` invocations, then succeed
    pub async fn flaky(&self, failures: u32) -> Result<serde_json::Value, &'static str> {
        let seen = self.invocations.fetch_add(1, Ordering::SeqCst);
        if seen < failures {
            Err("transient partner error")
        } else {
            Ok(serde_json::json!({ "status": "ok", "attempt": seen + 1 }))
        }
    }
}
