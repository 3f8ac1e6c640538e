//! # flexiai-config
//!
//! Configuration system for the FlexiAI gateway. Reads from `flexiai.toml`
//! first, then environment variables. A client can also be built entirely in
//! code from a [`FlexiConfig`] value.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    CircuitBreakerConfig, FlexiConfig, LoggingConfig, ProviderConfig, RetryConfig, SyncConfig,
};
