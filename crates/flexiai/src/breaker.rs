use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use flexiai_config::CircuitBreakerConfig;
use flexiai_core::{
    BreakerSnapshot, BreakerTransition, BreakerUpdate, CircuitState, ErrorKind, EventBus,
    FlexiError, Result, SyncEvent,
};

use crate::clock::Clock;

/// How a call was admitted through the breaker. A probe holds one of the
/// limited half-open slots and must release it when the call settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Clock millis of the last open. `Some` iff state is Open.
    opened_at: Option<u64>,
    in_flight_probes: u32,
    /// Newest remote event timestamp applied; older events are dropped.
    last_remote_ts_ms: i64,
}

/// Per-provider circuit breaker.
///
/// All transitions run under a provider-local mutex; the critical section is
/// pure state mutation, with event publication deferred until the lock is
/// released. Only transient errors move the failure counter: auth,
/// validation, content-policy, and caller-cancelled outcomes release their
/// probe slot and leave the state machine untouched.
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(
        provider: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            provider: provider.into(),
            config,
            clock,
            events,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                in_flight_probes: 0,
                last_remote_ts_ms: i64::MIN,
            }),
        }
    }

    /// Run `op` under this breaker's protection.
    ///
    /// Rejects immediately with [`FlexiError::CircuitOpen`] while the
    /// breaker is Open inside its cooldown, or when every half-open probe
    /// slot is taken. Otherwise invokes `op`, records the outcome, and
    /// returns it unchanged.
    pub async fn guard<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let result = op().await;
        match &result {
            Ok(_) => self.on_success(admission),
            Err(e) if e.kind() == ErrorKind::Transient => self.on_failure(admission),
            Err(_) => self.on_neutral(admission),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        self.snapshot_locked(&inner)
    }

    fn snapshot_locked(&self, inner: &BreakerInner) -> BreakerSnapshot {
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            opened_at_ms: inner.opened_at.map(|at| {
                let elapsed = self.clock.now_millis().saturating_sub(at);
                Utc::now().timestamp_millis() - elapsed as i64
            }),
        }
    }

    fn publish(&self, transition: BreakerTransition, snapshot: BreakerSnapshot) {
        self.events.publish(BreakerUpdate {
            provider: self.provider.clone(),
            transition,
            snapshot,
        });
    }

    fn admit(&self) -> Result<Admission> {
        let mut pending = None;
        let admission = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Ok(Admission::Normal),
                CircuitState::Open => {
                    let opened_at = inner.opened_at.unwrap_or(0);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    if elapsed >= self.config.timeout_ms
                        && inner.in_flight_probes < self.config.half_open_max_probes
                    {
                        inner.state = CircuitState::HalfOpen;
                        inner.opened_at = None;
                        inner.in_flight_probes += 1;
                        pending = Some((
                            BreakerTransition::HalfOpened,
                            self.snapshot_locked(&inner),
                        ));
                        Ok(Admission::Probe)
                    } else {
                        Err(FlexiError::CircuitOpen {
                            provider: self.provider.clone(),
                            retry_in_ms: self.config.timeout_ms.saturating_sub(elapsed),
                        })
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.in_flight_probes < self.config.half_open_max_probes {
                        inner.in_flight_probes += 1;
                        Ok(Admission::Probe)
                    } else {
                        Err(FlexiError::CircuitOpen {
                            provider: self.provider.clone(),
                            retry_in_ms: 0,
                        })
                    }
                }
            }
        };
        if let Some((transition, snapshot)) = pending {
            info!(provider = %self.provider, "circuit breaker half-open, probing");
            self.publish(transition, snapshot);
        }
        admission
    }

    fn release_probe(inner: &mut BreakerInner, admission: Admission) {
        if admission == Admission::Probe {
            inner.in_flight_probes = inner.in_flight_probes.saturating_sub(1);
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut pending = None;
        {
            let mut inner = self.inner.lock();
            Self::release_probe(&mut inner, admission);
            match inner.state {
                CircuitState::HalfOpen => {
                    if inner.success_count + 1 >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.success_count = 0;
                        inner.opened_at = None;
                        pending = Some((BreakerTransition::Closed, self.snapshot_locked(&inner)));
                    } else {
                        inner.success_count += 1;
                        pending = Some((
                            BreakerTransition::SuccessRecorded,
                            self.snapshot_locked(&inner),
                        ));
                    }
                }
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    pending = Some((
                        BreakerTransition::SuccessRecorded,
                        self.snapshot_locked(&inner),
                    ));
                }
                // A remote event re-opened the breaker while this call was in
                // flight; its outcome no longer changes local state.
                CircuitState::Open => {}
            }
        }
        if let Some((transition, snapshot)) = pending {
            if transition == BreakerTransition::Closed {
                info!(provider = %self.provider, "circuit breaker closed, provider recovered");
            }
            self.publish(transition, snapshot);
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut pending = None;
        {
            let mut inner = self.inner.lock();
            Self::release_probe(&mut inner, admission);
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now_millis());
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    pending = Some((BreakerTransition::Opened, self.snapshot_locked(&inner)));
                }
                CircuitState::Closed => {
                    inner.success_count = 0;
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(self.clock.now_millis());
                        pending = Some((BreakerTransition::Opened, self.snapshot_locked(&inner)));
                    } else {
                        pending = Some((
                            BreakerTransition::FailureRecorded,
                            self.snapshot_locked(&inner),
                        ));
                    }
                }
                CircuitState::Open => {}
            }
        }
        if let Some((transition, snapshot)) = pending {
            if transition == BreakerTransition::Opened {
                warn!(
                    provider = %self.provider,
                    cooldown_ms = self.config.timeout_ms,
                    "circuit breaker open, provider disabled"
                );
            }
            self.publish(transition, snapshot);
        }
    }

    fn on_neutral(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        Self::release_probe(&mut inner, admission);
    }

    /// Apply a peer worker's event to this breaker.
    ///
    /// Events older than the newest already applied are dropped, so a
    /// delayed `opened` cannot revert a fresher `closed`. State-change
    /// events overwrite the state machine; counter events overwrite the
    /// counters (last writer wins). Never republishes, so remote state does
    /// not echo back onto the wire.
    pub fn apply_remote(&self, event: &SyncEvent) {
        let mut inner = self.inner.lock();
        if event.timestamp_ms < inner.last_remote_ts_ms {
            debug!(
                provider = %self.provider,
                event_ts = event.timestamp_ms,
                last_applied = inner.last_remote_ts_ms,
                "ignoring stale sync event"
            );
            return;
        }
        inner.last_remote_ts_ms = event.timestamp_ms;

        match event.transition {
            BreakerTransition::Opened => {
                inner.state = CircuitState::Open;
                // Monotonic clocks do not transfer between processes; the
                // cooldown restarts at receipt.
                inner.opened_at = Some(self.clock.now_millis());
                inner.failure_count = event.snapshot.failure_count;
                inner.success_count = 0;
                inner.in_flight_probes = 0;
                warn!(
                    provider = %self.provider,
                    worker = %event.worker_id,
                    "circuit breaker opened by peer worker"
                );
            }
            BreakerTransition::HalfOpened => {
                inner.state = CircuitState::HalfOpen;
                inner.opened_at = None;
                inner.failure_count = event.snapshot.failure_count;
                inner.success_count = event.snapshot.success_count;
                inner.in_flight_probes = 0;
            }
            BreakerTransition::Closed => {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.in_flight_probes = 0;
                info!(
                    provider = %self.provider,
                    worker = %event.worker_id,
                    "circuit breaker closed by peer worker"
                );
            }
            BreakerTransition::FailureRecorded | BreakerTransition::SuccessRecorded => {
                inner.failure_count = event.snapshot.failure_count;
                inner.success_count = event.snapshot.success_count;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use flexiai_core::Usage;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::new(
            "openai",
            CircuitBreakerConfig::default(),
            Arc::new(clock.clone()),
            EventBus::default(),
        )
    }

    fn transient() -> FlexiError {
        FlexiError::Transient {
            provider: "openai".into(),
            message: "HTTP 503".into(),
        }
    }

    async fn fail_once(cb: &CircuitBreaker) {
        let _ = cb.guard(|| async { Err::<(), _>(transient()) }).await;
    }

    async fn succeed_once(cb: &CircuitBreaker) {
        let _ = cb.guard(|| async { Ok::<_, FlexiError>(Usage::new(1, 1)) }).await;
    }

    #[tokio::test]
    async fn starts_closed_and_passes_calls_through() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        assert_eq!(cb.state(), CircuitState::Closed);
        let out = cb.guard(|| async { Ok::<_, FlexiError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_at_threshold_not_before() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for i in 1..=4 {
            fail_once(&cb).await;
            assert_eq!(cb.state(), CircuitState::Closed, "closed after {i} failures");
            assert_eq!(cb.failure_count(), i);
        }
        fail_once(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 5);
    }

    #[tokio::test]
    async fn open_rejects_without_invoking() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..5 {
            fail_once(&cb).await;
        }
        let calls = AtomicU32::new(0);
        let out = cb
            .guard(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FlexiError>(())
            })
            .await;
        assert!(matches!(out, Err(FlexiError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cooldown_admits_single_probe_then_recovers() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..5 {
            fail_once(&cb).await;
        }
        clock.advance(60_000);

        // First call after cooldown is the probe.
        succeed_once(&cb).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Second consecutive success closes (success_threshold = 2).
        succeed_once(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        let snap = cb.snapshot();
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
        assert!(snap.opened_at_ms.is_none());
    }

    #[tokio::test]
    async fn probe_failure_reopens() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..5 {
            fail_once(&cb).await;
        }
        clock.advance(60_000);
        fail_once(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // Cooldown restarts from the probe failure.
        clock.advance(59_999);
        let out = cb.guard(|| async { Ok::<_, FlexiError>(()) }).await;
        assert!(matches!(out, Err(FlexiError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_limits_concurrent_probes() {
        let clock = ManualClock::new();
        let cb = Arc::new(breaker(&clock));
        for _ in 0..5 {
            fail_once(&cb).await;
        }
        clock.advance(60_000);

        let invoked = Arc::new(AtomicU32::new(0));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Hold the single probe slot open.
        let cb2 = Arc::clone(&cb);
        let invoked2 = Arc::clone(&invoked);
        let holder = tokio::spawn(async move {
            cb2.guard(|| async {
                invoked2.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.await;
                Ok::<_, FlexiError>(())
            })
            .await
        });

        // Wait until the probe is in flight.
        while invoked.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Concurrent callers see the breaker as open.
        let out = cb.guard(|| async { Ok::<_, FlexiError>(()) }).await;
        assert!(matches!(out, Err(FlexiError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn success_resets_failure_count_in_closed() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..4 {
            fail_once(&cb).await;
        }
        succeed_once(&cb).await;
        assert_eq!(cb.failure_count(), 0);
        // Four more failures still do not open.
        for _ in 0..4 {
            fail_once(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn permanent_errors_never_open() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..20 {
            let _ = cb
                .guard(|| async {
                    Err::<(), _>(FlexiError::Auth {
                        provider: "openai".into(),
                        message: "HTTP 401".into(),
                    })
                })
                .await;
            let _ = cb
                .guard(|| async {
                    Err::<(), _>(FlexiError::ContentPolicy {
                        provider: "openai".into(),
                        message: "refused".into(),
                    })
                })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_does_not_count() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        for _ in 0..10 {
            let _ = cb
                .guard(|| async { Err::<(), _>(FlexiError::DeadlineElapsed) })
                .await;
        }
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    fn remote_event(ts_ms: i64, transition: BreakerTransition, failures: u32) -> SyncEvent {
        SyncEvent {
            event_id: uuid::Uuid::new_v4(),
            worker_id: "peer".into(),
            timestamp_ms: ts_ms,
            provider: "openai".into(),
            transition,
            snapshot: BreakerSnapshot {
                state: match transition {
                    BreakerTransition::Opened => CircuitState::Open,
                    BreakerTransition::Closed => CircuitState::Closed,
                    BreakerTransition::HalfOpened => CircuitState::HalfOpen,
                    _ => CircuitState::Closed,
                },
                failure_count: failures,
                success_count: 0,
                opened_at_ms: None,
            },
        }
    }

    #[tokio::test]
    async fn remote_open_applies_and_cooldown_runs_locally() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        cb.apply_remote(&remote_event(1_000, BreakerTransition::Opened, 5));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 5);

        // Still open before the local cooldown elapses.
        let out = cb.guard(|| async { Ok::<_, FlexiError>(()) }).await;
        assert!(matches!(out, Err(FlexiError::CircuitOpen { .. })));

        clock.advance(60_000);
        succeed_once(&cb).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn stale_remote_events_are_ignored() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        cb.apply_remote(&remote_event(2_000, BreakerTransition::Closed, 0));
        // An older `opened` must not revert the newer `closed`.
        cb.apply_remote(&remote_event(1_000, BreakerTransition::Opened, 5));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn remote_counter_events_overwrite_counters() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        let mut event = remote_event(1_000, BreakerTransition::FailureRecorded, 3);
        event.snapshot.state = CircuitState::Closed;
        cb.apply_remote(&event);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 3);
    }

    #[tokio::test]
    async fn transitions_are_published_on_the_bus() {
        let clock = ManualClock::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let cb = CircuitBreaker::new(
            "openai",
            CircuitBreakerConfig::default(),
            Arc::new(clock.clone()),
            events,
        );
        fail_once(&cb).await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update.provider, "openai");
        assert_eq!(update.transition, BreakerTransition::FailureRecorded);
        assert_eq!(update.snapshot.failure_count, 1);

        for _ in 0..4 {
            fail_once(&cb).await;
        }
        let mut last = None;
        while let Ok(u) = rx.try_recv() {
            last = Some(u);
        }
        let last = last.unwrap();
        assert_eq!(last.transition, BreakerTransition::Opened);
        assert_eq!(last.snapshot.state, CircuitState::Open);
        assert_eq!(last.snapshot.failure_count, 5);
        assert!(last.snapshot.opened_at_ms.is_some());
    }
}
