//! End-to-end routing tests against mock adapters: priority order, failover,
//! breaker opening, permanent-error propagation, and request accounting.

use std::sync::Arc;
use std::time::Duration;

use flexiai::adapters::mock::{MockAdapter, MockReply};
use flexiai::{
    CircuitBreakerConfig, CircuitState, ErrorKind, FlexiAI, FlexiConfig, FlexiError,
    ProviderConfig, ProviderHealth, RetryConfig, UnifiedRequest,
};

/// Retry config with negligible delays so failure paths run fast.
fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_fraction: 0.0,
    }
}

/// A client with no built-in providers; tests register mocks themselves.
async fn bare_client(retry: RetryConfig, breaker: CircuitBreakerConfig) -> FlexiAI {
    let config = FlexiConfig {
        retry,
        circuit_breaker: breaker,
        ..Default::default()
    };
    FlexiAI::new(config).await.unwrap()
}

fn provider(name: &str, priority: u32) -> ProviderConfig {
    ProviderConfig::new(name, "test-key", priority)
}

#[tokio::test]
async fn happy_path_uses_highest_priority_provider() {
    let client = bare_client(fast_retry(3), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(MockAdapter::new("openai").with_response("Hello from openai"));
    let anthropic = Arc::new(MockAdapter::new("anthropic").with_response("should not serve"));
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);
    client.register_provider(provider("anthropic", 2), Arc::clone(&anthropic) as _);

    let resp = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();

    assert_eq!(resp.content, "Hello from openai");
    assert_eq!(resp.provider, "openai");
    assert_eq!(client.get_last_used_provider().as_deref(), Some("openai"));
    // Lower-priority providers are never invoked when the first succeeds.
    assert_eq!(anthropic.call_count(), 0);

    let stats = client.get_request_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.providers_used, vec!["openai"]);
}

#[tokio::test]
async fn failover_opens_breaker_and_serves_from_next_candidate() {
    // Five retry attempts so a single request can cross the threshold.
    let client = bare_client(fast_retry(5), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(MockAdapter::new("openai").with_default(MockReply::transient("HTTP 503")));
    let anthropic = Arc::new(MockAdapter::new("anthropic").with_response("Fallback reply"));
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);
    client.register_provider(provider("anthropic", 2), Arc::clone(&anthropic) as _);

    let resp = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();

    assert_eq!(resp.content, "Fallback reply");
    assert_eq!(resp.provider, "anthropic");
    assert_eq!(client.get_last_used_provider().as_deref(), Some("anthropic"));
    assert_eq!(openai.call_count(), 5);

    let status = client.get_provider_status("openai").unwrap();
    assert_eq!(status.circuit_breaker.state, CircuitState::Open);
    assert_eq!(status.circuit_breaker.failure_count, 5);
    assert_eq!(status.status, ProviderHealth::Unavailable);

    // Second request skips openai entirely: the breaker rejects before the
    // adapter is reached.
    let resp = client
        .chat_completion(UnifiedRequest::from_user("again"))
        .await
        .unwrap();
    assert_eq!(resp.provider, "anthropic");
    assert_eq!(openai.call_count(), 5);
    let stats = client.get_request_stats();
    assert_eq!(stats.per_provider["openai"].skipped_open, 1);
}

#[tokio::test]
async fn all_providers_failing_is_terminal() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_default(MockReply::transient("HTTP 500"))),
    );
    client.register_provider(
        provider("anthropic", 2),
        Arc::new(MockAdapter::new("anthropic").with_default(MockReply::transient("HTTP 529"))),
    );

    let err = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap_err();

    match err {
        FlexiError::AllProvidersFailed { failures } => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].provider, "openai");
            assert_eq!(failures[0].kind, ErrorKind::Transient);
            assert_eq!(failures[1].provider, "anthropic");
        }
        other => panic!("expected AllProvidersFailed, got {other}"),
    }

    let stats = client.get_request_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.successful_requests, 0);
}

#[tokio::test]
async fn auth_errors_fail_over_without_touching_the_breaker() {
    let client = bare_client(fast_retry(3), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(MockAdapter::new("openai").with_default(MockReply::auth("HTTP 401")));
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);
    client.register_provider(
        provider("anthropic", 2),
        Arc::new(MockAdapter::new("anthropic").with_response("served elsewhere")),
    );

    let resp = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();
    assert_eq!(resp.provider, "anthropic");

    // Auth errors are not retried: one call, no breaker movement.
    assert_eq!(openai.call_count(), 1);
    let status = client.get_provider_status("openai").unwrap();
    assert_eq!(status.circuit_breaker.state, CircuitState::Closed);
    assert_eq!(status.circuit_breaker.failure_count, 0);

    let stats = client.get_request_stats();
    assert_eq!(stats.per_provider["openai"].failures, 1);
    assert_eq!(stats.per_provider["openai"].skipped_open, 0);
}

#[tokio::test]
async fn content_policy_errors_surface_without_failover() {
    let client = bare_client(fast_retry(3), CircuitBreakerConfig::default()).await;
    let anthropic = Arc::new(MockAdapter::new("anthropic").with_response("unreachable"));
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_default(MockReply::content_policy("refused"))),
    );
    client.register_provider(provider("anthropic", 2), Arc::clone(&anthropic) as _);

    let err = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContentPolicy);
    // The same content would refuse everywhere; no other provider is tried.
    assert_eq!(anthropic.call_count(), 0);

    let stats = client.get_request_stats();
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.total_requests, 1);
}

#[tokio::test]
async fn pinned_provider_disables_failover() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    let anthropic = Arc::new(MockAdapter::new("anthropic").with_response("unreachable"));
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_default(MockReply::transient("HTTP 503"))),
    );
    client.register_provider(provider("anthropic", 2), Arc::clone(&anthropic) as _);

    let mut req = UnifiedRequest::from_user("hi");
    req.provider = Some("openai".into());
    let err = client.chat_completion(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(anthropic.call_count(), 0);
}

#[tokio::test]
async fn pinned_unknown_provider_is_a_validation_error() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_response("ok")),
    );

    let mut req = UnifiedRequest::from_user("hi");
    req.provider = Some("nonexistent".into());
    let err = client.chat_completion(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn invalid_requests_never_reach_a_provider() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(MockAdapter::new("openai").with_response("ok"));
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);

    let err = client
        .chat_completion(UnifiedRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut req = UnifiedRequest::from_user("hi");
    req.temperature = Some(5.0);
    assert!(client.chat_completion(req).await.is_err());

    assert_eq!(openai.call_count(), 0);
}

#[tokio::test]
async fn empty_registry_is_a_configuration_error() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    let err = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn provider_model_and_defaults_resolve_onto_the_request() {
    let config = FlexiConfig {
        default_temperature: Some(0.5),
        default_max_tokens: Some(256),
        retry: fast_retry(2),
        ..Default::default()
    };
    let client = FlexiAI::new(config).await.unwrap();
    let openai = Arc::new(MockAdapter::new("openai").with_response("ok"));
    client.register_provider(
        provider("openai", 1).with_model("gpt-4o-mini"),
        Arc::clone(&openai) as _,
    );

    client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();

    let recorded = openai.recorded_requests();
    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded[0].model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(recorded[0].temperature, Some(0.5));
    assert_eq!(recorded[0].max_tokens, Some(256));
}

#[tokio::test]
async fn deadline_elapsing_mid_attempt_cancels_without_breaker_blame() {
    let client = bare_client(fast_retry(3), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(
        MockAdapter::new("openai")
            .with_delay(Duration::from_secs(60))
            .with_response("too late"),
    );
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
    let err = client
        .chat_completion_with_deadline(UnifiedRequest::from_user("hi"), Some(deadline))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    // Caller-induced cancellation is not a provider failure.
    let status = client.get_provider_status("openai").unwrap();
    assert_eq!(status.circuit_breaker.failure_count, 0);
    assert_eq!(status.circuit_breaker.state, CircuitState::Closed);

    let stats = client.get_request_stats();
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.per_provider["openai"].failures, 0);
}

#[tokio::test]
async fn stats_balance_across_mixed_outcomes() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(
        MockAdapter::new("openai")
            .with_response("one")
            .with_reply(MockReply::transient("HTTP 500"))
            .with_response("two")
            .with_response("three"),
    );
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);

    // success, success-after-retry, success
    for _ in 0..3 {
        client
            .chat_completion(UnifiedRequest::from_user("hi"))
            .await
            .unwrap();
    }

    let stats = client.get_request_stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.successful_requests, 3);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(
        stats.successful_requests + stats.failed_requests,
        stats.total_requests
    );
    assert_eq!(stats.per_provider["openai"].attempts, 3);

    client.reset_stats();
    let stats = client.get_request_stats();
    assert_eq!(stats.total_requests, 0);
    assert!(stats.last_used_provider.is_none());
}

#[tokio::test]
async fn health_check_reports_per_provider_reachability() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    let openai = Arc::new(MockAdapter::new("openai").with_response("ok"));
    let anthropic = Arc::new(MockAdapter::new("anthropic").with_response("ok"));
    anthropic.set_healthy(false);
    client.register_provider(provider("openai", 1), Arc::clone(&openai) as _);
    client.register_provider(provider("anthropic", 2), Arc::clone(&anthropic) as _);

    let health = client.health_check().await;
    assert_eq!(health["openai"], true);
    assert_eq!(health["anthropic"], false);
}

#[tokio::test]
async fn global_client_lifecycle() {
    let config = FlexiConfig {
        retry: fast_retry(2),
        ..Default::default()
    };
    assert!(flexiai::global::get().is_err());
    let client = flexiai::global::init(config).await.unwrap();
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_response("from global")),
    );

    let via_global = flexiai::global::get().unwrap();
    let resp = via_global
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();
    assert_eq!(resp.content, "from global");

    flexiai::global::shutdown().await;
    assert!(flexiai::global::get().is_err());
}

#[tokio::test]
async fn registering_twice_replaces_and_resets_the_breaker() {
    let client = bare_client(fast_retry(2), CircuitBreakerConfig::default()).await;
    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_default(MockReply::transient("HTTP 500"))),
    );
    let _ = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await;
    assert!(
        client
            .get_provider_status("openai")
            .unwrap()
            .circuit_breaker
            .failure_count
            > 0
    );

    client.register_provider(
        provider("openai", 1),
        Arc::new(MockAdapter::new("openai").with_response("fresh")),
    );
    let status = client.get_provider_status("openai").unwrap();
    assert_eq!(status.circuit_breaker.failure_count, 0);
    assert_eq!(status.status, ProviderHealth::Available);

    let resp = client
        .chat_completion(UnifiedRequest::from_user("hi"))
        .await
        .unwrap();
    assert_eq!(resp.content, "fresh");
}
