use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use flexiai_config::{FlexiConfig, ProviderConfig, RetryConfig};
use flexiai_core::{
    BreakerSnapshot, CircuitState, ErrorKind, EventBus, FlexiError, ProviderFailure, Result,
    UnifiedRequest, UnifiedResponse,
};
use flexiai_sync::{RedisChannel, SyncChannel};

use crate::adapters::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter};
use crate::clock::{Clock, MonotonicClock};
use crate::provider::Provider;
use crate::registry::{ProviderEntry, ProviderRegistry};
use crate::retry::invoke_with_retry;
use crate::stats::{RequestStats, RequestStatsSnapshot};
use crate::sync::StateSynchronizer;

/// Coarse availability derived from the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    Available,
    Degraded,
    Unavailable,
}

/// Introspection view returned by [`FlexiAI::get_provider_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub model: String,
    pub priority: u32,
    pub status: ProviderHealth,
    pub circuit_breaker: BreakerSnapshot,
}

/// The FlexiAI gateway client.
///
/// Routes each request to the highest-priority provider whose breaker admits
/// it, retries transient faults within a provider, fails over across
/// providers, and keeps request statistics. Reentrant: any number of
/// `chat_completion` calls may run concurrently on one client.
pub struct FlexiAI {
    registry: Arc<ProviderRegistry>,
    stats: Arc<RequestStats>,
    retry: RetryConfig,
    default_model: Option<String>,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    events: EventBus,
    synchronizer: Option<StateSynchronizer>,
    worker_id: String,
}

/// Assembles a [`FlexiAI`] client, allowing tests and embedders to inject a
/// coordination channel or clock before construction.
pub struct FlexiAIBuilder {
    config: FlexiConfig,
    channel: Option<Arc<dyn SyncChannel>>,
    clock: Option<Arc<dyn Clock>>,
}

impl FlexiAIBuilder {
    /// Use this channel for state sync instead of the configured backend.
    pub fn with_channel(mut self, channel: Arc<dyn SyncChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Drive breaker cooldowns from this clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn build(self) -> Result<FlexiAI> {
        let config = self.config;
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(FlexiError::Configuration(e)),
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::default()));
        let events = EventBus::default();
        let registry = Arc::new(ProviderRegistry::new(
            config.circuit_breaker,
            clock,
            events.clone(),
        ));
        for provider in &config.providers {
            let adapter = build_adapter(provider)?;
            registry.register(provider.clone(), adapter);
        }

        let worker_id = format!("{}-{}", std::process::id(), Uuid::new_v4().simple());

        // An injected channel means the caller wants sync regardless of the
        // config; otherwise the backend comes from `sync`. Backend loss is
        // non-fatal: the gateway degrades to process-local breakers.
        let channel: Option<Arc<dyn SyncChannel>> = match self.channel {
            Some(channel) => Some(channel),
            None if config.sync.enabled && config.sync.backend == "redis" => {
                match RedisChannel::connect(&config.sync.redis_url()).await {
                    Ok(channel) => Some(Arc::new(channel)),
                    Err(e) => {
                        warn!(error = %e, "sync backend unavailable, using process-local breakers");
                        None
                    }
                }
            }
            None => None,
        };

        let synchronizer = match channel {
            Some(channel) => {
                match StateSynchronizer::start(
                    &config.sync,
                    worker_id.clone(),
                    Arc::clone(&registry),
                    events.clone(),
                    channel,
                )
                .await
                {
                    Ok(sync) => Some(sync),
                    Err(e) => {
                        warn!(error = %e, "state sync failed to start, using process-local breakers");
                        None
                    }
                }
            }
            None => None,
        };

        info!(
            worker_id = %worker_id,
            providers = config.providers.len(),
            sync = synchronizer.is_some(),
            "flexiai client initialized"
        );

        Ok(FlexiAI {
            registry,
            stats: Arc::new(RequestStats::new()),
            retry: config.retry,
            default_model: config.default_model,
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
            events,
            synchronizer,
            worker_id,
        })
    }
}

fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.name.as_str() {
        "openai" => Ok(Arc::new(OpenAiAdapter::new(config)?)),
        "anthropic" => Ok(Arc::new(AnthropicAdapter::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiAdapter::new(config)?)),
        other => Err(FlexiError::Configuration(format!(
            "no built-in adapter for provider '{other}'; register one with register_provider"
        ))),
    }
}

impl FlexiAI {
    /// Build a client from configuration, connecting the configured sync
    /// backend if one is enabled.
    pub async fn new(config: FlexiConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: FlexiConfig) -> FlexiAIBuilder {
        FlexiAIBuilder {
            config,
            channel: None,
            clock: None,
        }
    }

    /// Register (or replace) a provider with a custom adapter.
    pub fn register_provider(&self, config: ProviderConfig, adapter: Arc<dyn Provider>) {
        self.registry.register(config, adapter);
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Route a chat-completion request with no caller deadline.
    pub async fn chat_completion(&self, request: UnifiedRequest) -> Result<UnifiedResponse> {
        self.chat_completion_with_deadline(request, None).await
    }

    /// Route a chat-completion request, giving up at `deadline`.
    ///
    /// Candidates are tried in priority order; a provider whose breaker is
    /// open is skipped, transient and auth failures move on to the next
    /// candidate, validation and content-policy errors surface immediately.
    /// Pinning `request.provider` disables failover.
    pub async fn chat_completion_with_deadline(
        &self,
        request: UnifiedRequest,
        deadline: Option<Instant>,
    ) -> Result<UnifiedResponse> {
        request.validate()?;
        let candidates = self.candidates(&request)?;
        let forced = request.provider.is_some();
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for entry in candidates {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    self.stats.record_failed_request();
                    return Err(FlexiError::DeadlineElapsed);
                }
            }

            let name = entry.name().to_string();
            let resolved = self.resolve_request(&request, &entry);
            self.stats.record_attempt(&name);

            let outcome = self.attempt(&entry, &resolved, deadline).await;
            match outcome {
                Ok(mut response) => {
                    response.provider = name.clone();
                    self.stats.record_success(&name);
                    debug!(provider = %name, "request served");
                    return Ok(response);
                }
                Err(e) => {
                    let kind = e.kind();
                    match kind {
                        ErrorKind::CircuitOpen => {
                            self.stats.record_skipped_open(&name);
                            debug!(provider = %name, "skipping provider, circuit open");
                        }
                        ErrorKind::Cancelled => {}
                        _ => self.stats.record_provider_failure(&name),
                    }

                    if kind == ErrorKind::Cancelled || !e.fails_over() || forced {
                        self.stats.record_failed_request();
                        return Err(e);
                    }
                    warn!(provider = %name, error = %e, "provider failed, trying next candidate");
                    failures.push(ProviderFailure {
                        provider: name,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.stats.record_failed_request();
        warn!(providers = failures.len(), "all providers failed");
        Err(FlexiError::AllProvidersFailed { failures })
    }

    /// The retried, breaker-guarded attempt sequence for one provider.
    ///
    /// Every adapter call is individually guarded, so each transient failure
    /// moves the breaker's counter and the breaker can open mid-sequence.
    /// Once it does, the next guard rejects with `CircuitOpen`, the retry
    /// engine treats that as permanent, and the sequence ends.
    async fn attempt(
        &self,
        entry: &ProviderEntry,
        request: &UnifiedRequest,
        deadline: Option<Instant>,
    ) -> Result<UnifiedResponse> {
        let adapter = Arc::clone(&entry.adapter);
        let name = entry.name();
        let breaker = &entry.breaker;
        let (result, attempts) = invoke_with_retry(name, &self.retry, deadline, || {
            breaker.guard(|| async {
                let fut = adapter.invoke(request);
                match deadline {
                    Some(d) => match tokio::time::timeout_at(d, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(FlexiError::DeadlineElapsed),
                    },
                    None => fut.await,
                }
            })
        })
        .await;
        debug!(provider = %name, attempts, ok = result.is_ok(), "attempt sequence finished");
        result
    }

    fn candidates(&self, request: &UnifiedRequest) -> Result<Vec<Arc<ProviderEntry>>> {
        if let Some(name) = &request.provider {
            let entry = self.registry.get(name).ok_or_else(|| {
                FlexiError::Validation(format!("provider '{name}' is not registered"))
            })?;
            Ok(vec![entry])
        } else {
            let list = self.registry.list();
            if list.is_empty() {
                return Err(FlexiError::Configuration("no providers registered".into()));
            }
            Ok(list)
        }
    }

    /// Fill unset request fields: request > provider config > gateway default.
    fn resolve_request(&self, request: &UnifiedRequest, entry: &ProviderEntry) -> UnifiedRequest {
        let mut resolved = request.clone();
        if resolved.model.is_none() {
            resolved.model = entry
                .config
                .model
                .clone()
                .or_else(|| self.default_model.clone());
        }
        if resolved.temperature.is_none() {
            resolved.temperature = self.default_temperature;
        }
        if resolved.max_tokens.is_none() {
            resolved.max_tokens = self.default_max_tokens;
        }
        resolved
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn get_request_stats(&self) -> RequestStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset()
    }

    pub fn get_last_used_provider(&self) -> Option<String> {
        self.stats.last_used_provider()
    }

    pub fn get_provider_status(&self, name: &str) -> Result<ProviderStatus> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| FlexiError::ProviderNotFound(name.to_string()))?;
        let snapshot = entry.breaker.snapshot();
        let status = match snapshot.state {
            CircuitState::Open => ProviderHealth::Unavailable,
            CircuitState::HalfOpen => ProviderHealth::Degraded,
            CircuitState::Closed if snapshot.failure_count > 0 => ProviderHealth::Degraded,
            CircuitState::Closed => ProviderHealth::Available,
        };
        Ok(ProviderStatus {
            name: entry.name().to_string(),
            model: entry
                .config
                .model
                .clone()
                .unwrap_or_else(|| entry.adapter.model().to_string()),
            priority: entry.config.priority,
            status,
            circuit_breaker: snapshot,
        })
    }

    /// Probe each registered provider's reachability.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for entry in self.registry.list() {
            let healthy = entry.adapter.health_check().await;
            results.insert(entry.name().to_string(), healthy);
        }
        results
    }

    /// In-process breaker event bus, for embedders that want to observe
    /// transitions (dashboards, metrics exporters).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stop the synchronizer and release the coordination backend.
    pub async fn shutdown(&self) {
        if let Some(sync) = &self.synchronizer {
            sync.shutdown().await;
        }
        info!(worker_id = %self.worker_id, "flexiai client shut down");
    }
}
