use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-provider request counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProviderCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Candidates passed over because their breaker was open.
    pub skipped_open: u64,
}

/// Read-only view returned by `get_request_stats()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Providers that have served at least one successful response.
    pub providers_used: Vec<String>,
    pub per_provider: HashMap<String, ProviderCounters>,
    pub last_used_provider: Option<String>,
}

/// In-memory request accounting for one worker process.
///
/// Request totals move only at request completion, and always in pairs
/// (total plus exactly one of successful/failed), so
/// `successful + failed == total` holds at every observable instant.
#[derive(Default)]
pub struct RequestStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    providers: Mutex<HashMap<String, ProviderCounters>>,
    last_used: Mutex<Option<String>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, provider: &str) {
        self.providers.lock().entry(provider.to_string()).or_default().attempts += 1;
    }

    /// A request completed successfully via `provider`.
    pub fn record_success(&self, provider: &str) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.providers.lock().entry(provider.to_string()).or_default().successes += 1;
        *self.last_used.lock() = Some(provider.to_string());
    }

    /// A request failed terminally (all candidates exhausted or a
    /// non-failover error surfaced).
    pub fn record_failed_request(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// One provider attempt failed (the request may still succeed elsewhere).
    pub fn record_provider_failure(&self, provider: &str) {
        self.providers.lock().entry(provider.to_string()).or_default().failures += 1;
    }

    pub fn record_skipped_open(&self, provider: &str) {
        self.providers.lock().entry(provider.to_string()).or_default().skipped_open += 1;
    }

    pub fn last_used_provider(&self) -> Option<String> {
        self.last_used.lock().clone()
    }

    pub fn provider_counters(&self, provider: &str) -> ProviderCounters {
        self.providers.lock().get(provider).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        let per_provider = self.providers.lock().clone();
        let mut providers_used: Vec<String> = per_provider
            .iter()
            .filter(|(_, c)| c.successes > 0)
            .map(|(name, _)| name.clone())
            .collect();
        providers_used.sort();
        RequestStatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            providers_used,
            per_provider,
            last_used_provider: self.last_used.lock().clone(),
        }
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.providers.lock().clear();
        *self.last_used.lock() = None;
    }
}
