use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

/// Circuit breaker state. Serialized snake_case so the wire and status
/// strings are `closed` / `open` / `half_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// What a breaker just did.
///
/// The first three are state changes and are never coalesced on the sync
/// channel; the counter events may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerTransition {
    Opened,
    HalfOpened,
    Closed,
    FailureRecorded,
    SuccessRecorded,
}

impl BreakerTransition {
    /// State-change events must reach every peer; counter events are
    /// best-effort and may be rate-limited.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            BreakerTransition::Opened | BreakerTransition::HalfOpened | BreakerTransition::Closed
        )
    }
}

/// Point-in-time view of a breaker, published alongside each transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Wall-clock epoch millis of the last open, for observability. `None`
    /// unless the breaker is Open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at_ms: Option<i64>,
}

/// A breaker transition observed in this process, before it is stamped for
/// the wire. Flows over the in-process [`EventBus`].
#[derive(Debug, Clone)]
pub struct BreakerUpdate {
    pub provider: String,
    pub transition: BreakerTransition,
    pub snapshot: BreakerSnapshot,
}

/// The cross-process message: a [`BreakerUpdate`] stamped with the worker
/// identity and a wall-clock timestamp for the monotonic-application rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub event_id: Uuid,
    pub worker_id: String,
    pub timestamp_ms: i64,
    pub provider: String,
    pub transition: BreakerTransition,
    pub snapshot: BreakerSnapshot,
}

impl SyncEvent {
    /// Stamp a local update for publication.
    pub fn from_update(worker_id: &str, update: &BreakerUpdate) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            worker_id: worker_id.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
            provider: update.provider.clone(),
            transition: update.transition,
            snapshot: update.snapshot,
        }
    }
}

/// Broadcast-based bus carrying breaker updates inside one process.
///
/// Breakers publish every transition; the state synchronizer subscribes and
/// forwards to the coordination backend. Lossy by design: a slow subscriber
/// misses counter ticks, and the snapshot carried by the next event
/// resynchronizes it.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<BreakerUpdate>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, update: BreakerUpdate) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerUpdate> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
