use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Root configuration, mapping to `flexiai.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexiConfig {
    /// Providers in no particular order; routing order comes from `priority`.
    pub providers: Vec<ProviderConfig>,
    /// Model used when neither the request nor the provider names one.
    pub default_model: Option<String>,
    /// Temperature used when the request does not set one.
    pub default_temperature: Option<f32>,
    /// Max tokens used when the request does not set one.
    pub default_max_tokens: Option<u32>,
    pub retry: RetryConfig,
    /// Breaker settings applied to every provider unless the provider
    /// carries its own override.
    pub circuit_breaker: CircuitBreakerConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

// ── Providers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Unique identifier; lowercase alphanumeric. Built-in adapters are
    /// selected by name: "openai", "anthropic", "gemini".
    pub name: String,
    /// Lower is preferred. Ties break by registration order.
    pub priority: u32,
    pub api_key: String,
    /// Default model for this provider; the request's `model` wins.
    pub model: Option<String>,
    /// Per-attempt HTTP timeout.
    pub timeout_ms: u64,
    /// Provider-specific knobs merged into the adapter request.
    pub extra_config: HashMap<String, serde_json::Value>,
    /// Per-provider breaker override.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: 1,
            api_key: String::new(),
            model: None,
            timeout_ms: 30_000,
            extra_config: HashMap::new(),
            circuit_breaker: None,
        }
    }
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            priority,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_circuit_breaker(mut self, cb: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(cb);
        self
    }
}

// ── Retry ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per provider, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Uniform jitter applied to each delay, as a fraction in [0, 1].
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_fraction: 0.1,
        }
    }
}

// ── Circuit breaker ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before the breaker opens.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the breaker closes.
    pub success_threshold: u32,
    /// Cooldown after opening before a probe is admitted.
    pub timeout_ms: u64,
    /// Concurrent probes admitted while half-open.
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
            half_open_max_probes: 1,
        }
    }
}

// ── Cross-worker sync ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// "redis" or "none".
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Isolates channels and snapshot keys between deployments.
    pub namespace: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "none".into(),
            host: "127.0.0.1".into(),
            port: 6379,
            db: 0,
            password: None,
            namespace: "default".into(),
        }
    }
}

impl SyncConfig {
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Pub/sub channel carrying breaker events for this namespace.
    pub fn channel_topic(&self) -> String {
        format!("flexiai:cb:{}", self.namespace)
    }

    /// KV key holding the latest state-change event for one provider.
    pub fn snapshot_key(&self, provider: &str) -> String {
        format!("flexiai:cb:{}:state:{}", self.namespace, provider)
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
    /// Append to this file instead of stderr when set.
    pub file_path: Option<PathBuf>,
    /// Rotation hints for deployment tooling; the subscriber itself appends.
    pub max_bytes: u64,
    pub backup_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file_path: None,
            max_bytes: 10 * 1024 * 1024,
            backup_count: 5,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

fn valid_provider_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

impl FlexiConfig {
    /// Validate the configuration. Hard violations are an `Err`; an `Ok`
    /// carries warnings worth logging.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for p in &self.providers {
            if !valid_provider_name(&p.name) {
                return Err(format!(
                    "provider name '{}' must be lowercase alphanumeric",
                    p.name
                ));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(format!("duplicate provider name '{}'", p.name));
            }
            if p.priority == 0 {
                return Err(format!(
                    "provider '{}': priority must be a positive integer",
                    p.name
                ));
            }
            if p.timeout_ms == 0 {
                return Err(format!("provider '{}': timeout_ms must be positive", p.name));
            }
            if p.api_key.is_empty() {
                warnings.push(format!("provider '{}' has no api_key configured", p.name));
            }
        }

        if let Some(t) = self.default_temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("default_temperature {t} outside [0.0, 2.0]"));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(format!(
                "retry.jitter_fraction {} outside [0, 1]",
                self.retry.jitter_fraction
            ));
        }
        for cb in std::iter::once(&self.circuit_breaker)
            .chain(self.providers.iter().filter_map(|p| p.circuit_breaker.as_ref()))
        {
            if cb.failure_threshold == 0 || cb.success_threshold == 0 {
                return Err("circuit breaker thresholds must be positive".into());
            }
            if cb.half_open_max_probes == 0 {
                return Err("circuit_breaker.half_open_max_probes must be positive".into());
            }
        }

        match self.sync.backend.as_str() {
            "redis" | "none" => {}
            other => return Err(format!("unknown sync backend '{other}'")),
        }
        if self.sync.enabled && self.sync.backend == "none" {
            warnings.push("sync.enabled is set but sync.backend is 'none'; state will not be shared".into());
        }
        if self.providers.is_empty() {
            warnings.push("no providers configured".into());
        }

        Ok(warnings)
    }
}
