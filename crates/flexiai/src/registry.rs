use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use flexiai_config::{CircuitBreakerConfig, ProviderConfig};
use flexiai_core::EventBus;

use crate::breaker::CircuitBreaker;
use crate::clock::Clock;
use crate::provider::Provider;

/// One registered provider: adapter, breaker, and the config that built them.
pub struct ProviderEntry {
    pub config: ProviderConfig,
    pub adapter: Arc<dyn Provider>,
    pub breaker: Arc<CircuitBreaker>,
    registration: u64,
}

impl ProviderEntry {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Thread-safe mapping from provider name to (adapter, breaker).
///
/// Routing order is priority ascending, ties broken by registration order.
/// Registering an existing name replaces the entry; the previous adapter and
/// breaker are dropped with the last reference.
pub struct ProviderRegistry {
    entries: RwLock<Vec<Arc<ProviderEntry>>>,
    seq: AtomicU64,
    breaker_defaults: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ProviderRegistry {
    pub fn new(
        breaker_defaults: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            breaker_defaults,
            clock,
            events,
        }
    }

    /// Register a provider, replacing any existing entry with the same name.
    pub fn register(&self, config: ProviderConfig, adapter: Arc<dyn Provider>) -> Arc<ProviderEntry> {
        let breaker_config = config.circuit_breaker.unwrap_or(self.breaker_defaults);
        let breaker = Arc::new(CircuitBreaker::new(
            config.name.clone(),
            breaker_config,
            Arc::clone(&self.clock),
            self.events.clone(),
        ));
        let entry = Arc::new(ProviderEntry {
            config,
            adapter,
            breaker,
            registration: self.seq.fetch_add(1, Ordering::Relaxed),
        });

        let mut entries = self.entries.write();
        entries.retain(|e| e.name() != entry.name());
        info!(provider = entry.name(), priority = entry.config.priority, "registered provider");
        entries.push(Arc::clone(&entry));
        entry
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderEntry>> {
        self.entries.read().iter().find(|e| e.name() == name).cloned()
    }

    /// All entries in routing order.
    pub fn list(&self) -> Vec<Arc<ProviderEntry>> {
        let mut entries: Vec<_> = self.entries.read().iter().cloned().collect();
        entries.sort_by_key(|e| (e.config.priority, e.registration));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Tear down every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
