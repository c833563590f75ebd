//! End-to-end behavior of breakers, retries, fallbacks and degradation

mod common;

use common::{breaker_config, init_test_logging, PartnerStub};
use concierge_resilience::config::ResilienceConfig;
use concierge_resilience::resilience::{
    degraded_impl, BreakerAccounting, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    FallbackRegistry, GracefulDegradationManager, ResilientService, RetryPolicy,
};
use concierge_resilience::{CallError, ResilienceContext};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

#[tokio::test(start_paused = true)]
async fn test_breaker_lifecycle_open_half_open_closed() {
    init_test_logging();
    info!("🧪 Breaker lifecycle: two failures open, cooldown, one success closes");

    let breaker = CircuitBreaker::new(
        "ai_service",
        breaker_config(2, Duration::from_millis(100), 1),
    );
    let stub = PartnerStub::new();

    for _ in 0..2 {
        let result = breaker.execute(|| stub.fail("model overloaded")).await;
        assert!(matches!(result, Err(CallError::Operation("model overloaded"))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(stub.invocations(), 2);

    // Rejected without reaching the partner
    let rejected = breaker.execute(|| stub.succeed()).await;
    match rejected {
        Err(CallError::CircuitOpen(open)) => {
            assert_eq!(open.name, "ai_service");
            assert_eq!(open.state, CircuitState::Open);
            assert!(open.remaining_cooldown <= Duration::from_millis(100));
        }
        other => panic!("expected circuit open, got {other:?}"),
    }
    assert_eq!(stub.invocations(), 2);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let recovered = breaker.execute(|| stub.succeed()).await;
    assert!(recovered.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.stats();
    assert_eq!(stats.failure_count, 0);
    assert_eq!(stats.total_calls, 4);
    assert_eq!(stats.total_rejections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_never_invokes_operation_before_cooldown() {
    let breaker = CircuitBreaker::new("maps", breaker_config(1, Duration::from_secs(30), 2));
    let stub = PartnerStub::new();

    let _ = breaker.execute(|| stub.fail("tile server down")).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    for _ in 0..10 {
        sleep(Duration::from_secs(2)).await;
        let result = breaker.execute(|| stub.succeed()).await;
        assert!(result.unwrap_err().is_circuit_open());
    }

    assert_eq!(stub.invocations(), 1);
    assert_eq!(breaker.stats().total_rejections, 10);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_needs_consecutive_successes() {
    let breaker = CircuitBreaker::new(
        "booking_partner",
        breaker_config(1, Duration::from_secs(1), 3),
    );
    let stub = PartnerStub::new();

    let _ = breaker.execute(|| stub.fail("502")).await;
    sleep(Duration::from_millis(1100)).await;

    // Two successes are not enough, and a failure reopens regardless
    for _ in 0..2 {
        assert!(breaker.execute(|| stub.succeed()).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }
    let _ = breaker.execute(|| stub.fail("502")).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    sleep(Duration::from_millis(1100)).await;
    for _ in 0..3 {
        tokio_test::assert_ok!(breaker.execute(|| stub.succeed()).await);
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_retry_timing_without_jitter() {
    let policy = RetryPolicy::new(3)
        .with_base_delay(Duration::from_secs(1))
        .with_backoff_factor(2.0)
        .with_jitter(false);

    let start = Instant::now();
    let attempts: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), String> = policy
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                let mut attempts = attempts.lock();
                attempts.push(start.elapsed());
                Err(format!("attempt {} failed", attempts.len()))
            }
        })
        .await;

    assert_eq!(result.unwrap_err(), "attempt 3 failed");

    let attempts = attempts.lock();
    assert_eq!(
        *attempts,
        vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_service_serves_fallback() {
    let fallbacks: Arc<FallbackRegistry> = Arc::new(FallbackRegistry::new());
    fallbacks.register_static("weather", json!({ "forecast": "unavailable", "cached": true }));

    let service = ResilientService::new(
        "weather",
        Arc::new(CircuitBreaker::new("weather", CircuitBreakerConfig::for_weather())),
        RetryPolicy::no_retry(),
        fallbacks,
    );
    let stub = PartnerStub::new();

    let value = service.call(|| stub.fail("weather api 503")).await.unwrap();
    assert_eq!(value["cached"], true);

    let metrics = service.get_metrics();
    assert_eq!(metrics.call_count, 1);
    assert_eq!(metrics.fallback_count, 1);
    assert_eq!(metrics.failure_count, 1);
    assert_eq!(metrics.success_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_service_without_fallback_returns_original_error() {
    let service: ResilientService = ResilientService::new(
        "lounges",
        Arc::new(CircuitBreaker::new("lounges", CircuitBreakerConfig::default())),
        RetryPolicy::no_retry(),
        Arc::new(FallbackRegistry::new()),
    );
    let stub = PartnerStub::new();

    let err = service.call(|| stub.fail("lounge api unreachable")).await.unwrap_err();
    assert_eq!(err.into_operation(), Some("lounge api unreachable"));
}

#[tokio::test(start_paused = true)]
async fn test_accounting_modes_from_configuration() {
    init_test_logging();

    let mut config = ResilienceConfig::default();
    config.retry.jitter = false;
    config.retry.base_delay_seconds = 0.1;
    config.retry.max_delay_seconds = 1.0;
    if let Some(maps) = config.circuit_breakers.component_configs.get_mut("maps") {
        maps.failure_threshold = 2;
    }

    let mut per_attempt = config.retry.clone();
    per_attempt.accounting = BreakerAccounting::PerAttempt;
    config.services.insert(
        "weather".to_string(),
        concierge_resilience::config::ServiceSettings {
            retry: Some(per_attempt),
        },
    );

    let context = ResilienceContext::from_config(config).unwrap();

    // Per-call: two transient failures are absorbed and the breaker sees one success
    let maps = context.service("maps").await;
    let flaky = PartnerStub::new();
    for _ in 0..3 {
        let before = flaky.invocations();
        let result = maps.call(|| flaky.flaky(before + 2)).await;
        assert!(result.is_ok());
    }
    assert_eq!(maps.breaker().state(), CircuitState::Closed);
    assert_eq!(maps.breaker().stats().total_failures, 0);

    // Per-attempt: every failed attempt counts, weather opens after 3
    let weather = context.service("weather").await;
    let down = PartnerStub::new();
    let result = weather.call(|| down.fail("weather api 500")).await;
    assert!(result.is_err());
    assert_eq!(down.invocations(), 3);
    assert_eq!(weather.breaker().state(), CircuitState::Open);
}

#[tokio::test]
async fn test_stories_feature_degrades_with_ai_service() {
    init_test_logging();

    let manager: GracefulDegradationManager = GracefulDegradationManager::new();
    manager.register_feature(
        "stories",
        ["ai_service"],
        Some(degraded_impl(|| async {
            Ok(json!("Tonight the old harbour glows under lanterns"))
        })),
    );
    let primary = PartnerStub::new();

    manager.set_service_health("ai_service", false);
    assert_eq!(manager.is_feature_enabled("stories"), Some(false));

    let story = manager
        .execute_feature("stories", || primary.succeed())
        .await
        .unwrap();
    assert_eq!(story, json!("Tonight the old harbour glows under lanterns"));
    assert_eq!(primary.invocations(), 0);

    manager.set_service_health("ai_service", true);
    let story = manager
        .execute_feature("stories", || primary.succeed())
        .await
        .unwrap();
    assert_eq!(story["status"], "ok");
    assert_eq!(primary.invocations(), 1);

    let status = manager.get_feature_status();
    assert!(status["stories"].enabled);
    assert!(status["stories"].has_degraded_implementation);
}

#[tokio::test]
async fn test_context_syncs_breaker_state_into_features() {
    let context = ResilienceContext::from_config(ResilienceConfig::default()).unwrap();
    context
        .degradation()
        .register_feature("itinerary_map", ["maps"], None);

    let maps = context.circuit_breakers().get_circuit_breaker("maps").await;
    let stub = PartnerStub::new();
    for _ in 0..maps.config().failure_threshold {
        let _ = maps.execute(|| stub.fail("tile server down")).await;
    }

    context.sync_feature_health().await;
    assert_eq!(
        context.degradation().is_feature_enabled("itinerary_map"),
        Some(false)
    );
    assert_eq!(context.degradation().unhealthy_services(), vec!["maps".to_string()]);

    // Services built from the context fall back through its shared registry
    context
        .fallbacks()
        .register_static("maps", json!({ "tiles": "cached" }));
    let service = context.service("maps").await;
    let value = service.call(|| stub.succeed()).await.unwrap();
    assert_eq!(value["tiles"], "cached");
    assert_eq!(stub.invocations(), maps.config().failure_threshold);
}
