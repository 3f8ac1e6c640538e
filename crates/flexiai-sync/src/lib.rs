//! # flexiai-sync
//!
//! Backend-agnostic pub/sub plumbing for sharing circuit-breaker state
//! between worker processes. The gateway publishes breaker transitions on a
//! [`SyncChannel`] and applies the events it receives from peers; which wire
//! carries them is this crate's concern.
//!
//! Two backends ship: [`RedisChannel`] (the reference deployment) and
//! [`MemoryChannel`] (an in-process hub used by tests to stand in for a
//! shared broker).

pub mod channel;
pub mod memory;
pub mod redis;

pub use channel::{SubscribeHandler, SyncChannel};
pub use memory::{MemoryChannel, MemoryHub};
pub use self::redis::RedisChannel;
