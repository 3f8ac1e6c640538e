use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification driving retry, breaker, and failover policy.
///
/// Only [`ErrorKind::Transient`] is retried and counted by circuit breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Configuration,
    Transient,
    Auth,
    ContentPolicy,
    CircuitOpen,
    Cancelled,
    Exhausted,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transient => "transient",
            ErrorKind::Auth => "auth",
            ErrorKind::ContentPolicy => "content_policy",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// One provider's terminal error within a failed request, kept for the
/// exhaustion summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Unified error type for the entire FlexiAI gateway.
#[derive(Error, Debug)]
pub enum FlexiError {
    // ── Input / configuration errors ───────────────────────────
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    // ── Provider errors ────────────────────────────────────────
    #[error("transient provider error: {provider}: {message}")]
    Transient { provider: String, message: String },

    #[error("authentication rejected by {provider}: {message}")]
    Auth { provider: String, message: String },

    #[error("content refused by {provider}: {message}")]
    ContentPolicy { provider: String, message: String },

    // ── Reliability engine errors ──────────────────────────────
    #[error("circuit breaker open for {provider}, retry in {retry_in_ms}ms")]
    CircuitOpen { provider: String, retry_in_ms: u64 },

    #[error("request deadline elapsed")]
    DeadlineElapsed,

    #[error("all providers failed: {failures:?}")]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    // ── Sync errors ────────────────────────────────────────────
    #[error("state sync error: {0}")]
    Sync(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FlexiError {
    /// Classify this error for retry / breaker / failover decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlexiError::Validation(_) | FlexiError::ProviderNotFound(_) => ErrorKind::Validation,
            FlexiError::Configuration(_) => ErrorKind::Configuration,
            FlexiError::Transient { .. } => ErrorKind::Transient,
            FlexiError::Auth { .. } => ErrorKind::Auth,
            FlexiError::ContentPolicy { .. } => ErrorKind::ContentPolicy,
            FlexiError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            FlexiError::DeadlineElapsed => ErrorKind::Cancelled,
            FlexiError::AllProvidersFailed { .. } => ErrorKind::Exhausted,
            FlexiError::Sync(_)
            | FlexiError::Io(_)
            | FlexiError::Serialization(_)
            | FlexiError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the retry engine may attempt this call again.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether the router should move on to the next candidate provider.
    /// Auth errors fail over (other providers may hold different keys);
    /// validation and content-policy errors surface to the caller.
    pub fn fails_over(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::Auth | ErrorKind::CircuitOpen
        )
    }
}

pub type Result<T> = std::result::Result<T, FlexiError>;
