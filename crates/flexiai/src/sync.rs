//! Cross-worker breaker-state synchronization.
//!
//! Every breaker transition in this process is stamped with the worker id
//! and published on the coordination channel; events arriving from peers are
//! applied to the matching local breaker. Workers converge within one
//! pub/sub round-trip; the monotonic-timestamp rule in
//! [`CircuitBreaker::apply_remote`](crate::breaker::CircuitBreaker::apply_remote)
//! keeps delayed events from reverting fresher state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flexiai_config::SyncConfig;
use flexiai_core::{BreakerUpdate, EventBus, Result, SyncEvent};
use flexiai_sync::{SubscribeHandler, SyncChannel};

use crate::registry::ProviderRegistry;

/// Counter events (`failure_recorded` / `success_recorded`) are limited to
/// one per provider per this interval; state changes always go out.
const COALESCE_INTERVAL_MS: i64 = 100;

/// Bridges the in-process event bus and the coordination channel.
pub struct StateSynchronizer {
    worker_id: String,
    channel: Arc<dyn SyncChannel>,
    outbound: JoinHandle<()>,
}

impl StateSynchronizer {
    /// Wire up rehydration, the inbound subscription, and the outbound pump.
    pub async fn start(
        config: &SyncConfig,
        worker_id: String,
        registry: Arc<ProviderRegistry>,
        events: EventBus,
        channel: Arc<dyn SyncChannel>,
    ) -> Result<Self> {
        let topic = config.channel_topic();

        // Rehydrate: a freshly started worker adopts the last state-change
        // event each peer persisted, so it does not probe a provider the
        // fleet already knows is down.
        for entry in registry.list() {
            let key = config.snapshot_key(entry.name());
            match channel.read_snapshot(&key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<SyncEvent>(&bytes) {
                    Ok(event) => {
                        if event.worker_id != worker_id {
                            entry.breaker.apply_remote(&event);
                            info!(
                                provider = entry.name(),
                                state = ?event.snapshot.state,
                                "rehydrated breaker state from snapshot"
                            );
                        }
                    }
                    Err(e) => warn!(provider = entry.name(), error = %e, "undecodable snapshot"),
                },
                Ok(None) => {}
                Err(e) => warn!(provider = entry.name(), error = %e, "snapshot read failed"),
            }
        }

        // Inbound: apply peer events to local breakers.
        {
            let registry = Arc::clone(&registry);
            let own_worker = worker_id.clone();
            let handler: SubscribeHandler = Arc::new(move |payload: Vec<u8>| {
                let event = match serde_json::from_slice::<SyncEvent>(&payload) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(error = %e, "dropping undecodable sync event");
                        return;
                    }
                };
                if event.worker_id == own_worker {
                    return;
                }
                match registry.get(&event.provider) {
                    Some(entry) => entry.breaker.apply_remote(&event),
                    None => {
                        debug!(provider = %event.provider, "dropping event for unknown provider")
                    }
                }
            });
            channel.subscribe(&topic, handler).await?;
        }

        // Outbound: forward local transitions to the fleet.
        let outbound = tokio::spawn(outbound_pump(
            events.subscribe(),
            Arc::clone(&channel),
            config.clone(),
            worker_id.clone(),
        ));

        info!(worker_id = %worker_id, topic = %topic, "breaker state sync started");
        Ok(Self {
            worker_id,
            channel,
            outbound,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn shutdown(&self) {
        self.outbound.abort();
        self.channel.close().await;
    }
}

async fn outbound_pump(
    mut rx: broadcast::Receiver<BreakerUpdate>,
    channel: Arc<dyn SyncChannel>,
    config: SyncConfig,
    worker_id: String,
) {
    let topic = config.channel_topic();
    let mut last_counter_sent: HashMap<String, i64> = HashMap::new();

    loop {
        let update = match rx.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Counter events are best-effort; the next event's snapshot
                // carries absolute values, so peers resynchronize.
                warn!(missed, "event bus lagged, some breaker events not forwarded");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let event = SyncEvent::from_update(&worker_id, &update);
        if !update.transition.is_state_change() {
            let last = last_counter_sent
                .get(&update.provider)
                .copied()
                .unwrap_or(i64::MIN);
            if event.timestamp_ms.saturating_sub(last) < COALESCE_INTERVAL_MS {
                continue;
            }
            last_counter_sent.insert(update.provider.clone(), event.timestamp_ms);
        }

        let bytes = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode breaker event");
                continue;
            }
        };
        if let Err(e) = channel.publish(&topic, bytes.clone()).await {
            // Non-fatal: the fleet degrades to process-local breakers.
            warn!(error = %e, "failed to publish breaker event");
            continue;
        }
        if update.transition.is_state_change() {
            let key = config.snapshot_key(&update.provider);
            if let Err(e) = channel.write_snapshot(&key, bytes).await {
                debug!(error = %e, "failed to persist breaker snapshot");
            }
        }
    }
}
