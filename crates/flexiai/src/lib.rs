//! # flexiai
//!
//! Unified gateway over multiple LLM providers with automatic failover.
//! One [`FlexiAI`] client routes [`UnifiedRequest`]s to the highest-priority
//! healthy provider; per-provider circuit breakers take degraded providers
//! out of rotation, bounded retries absorb transient faults, and workers
//! deployed side by side share breaker state over a pub/sub channel.

pub mod adapters;
pub mod breaker;
pub mod client;
pub mod clock;
pub mod global;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod stats;
pub mod sync;

pub use breaker::CircuitBreaker;
pub use client::{FlexiAI, FlexiAIBuilder, ProviderHealth, ProviderStatus};
pub use logging::init_logging;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use prompt::Prompt;
pub use provider::Provider;
pub use registry::{ProviderEntry, ProviderRegistry};
pub use stats::{ProviderCounters, RequestStats, RequestStatsSnapshot};
pub use sync::StateSynchronizer;

pub use flexiai_config::{
    CircuitBreakerConfig, FlexiConfig, LoggingConfig, ProviderConfig, RetryConfig, SyncConfig,
};
pub use flexiai_core::{
    ChatMessage, CircuitState, ErrorKind, FinishReason, FlexiError, Result, Role, UnifiedRequest,
    UnifiedResponse, Usage,
};
