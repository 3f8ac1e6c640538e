//! # flexiai-core
//!
//! Core types and primitives for the FlexiAI gateway. This crate defines the
//! shared vocabulary used by every other crate in the workspace: the unified
//! request/response model, the error taxonomy, and the circuit-breaker event
//! types that flow between workers.

pub mod error;
pub mod event;
pub mod model;

pub use error::{ErrorKind, FlexiError, ProviderFailure, Result};
pub use event::{
    BreakerSnapshot, BreakerTransition, BreakerUpdate, CircuitState, EventBus, SyncEvent,
};
pub use model::{ChatMessage, FinishReason, Role, UnifiedRequest, UnifiedResponse, Usage};
