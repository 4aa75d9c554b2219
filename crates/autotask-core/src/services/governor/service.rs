//! Concurrency and quota governor
//!
//! Every upstream call runs through [`Governor::run`]. Admission is a fair
//! (FIFO) semaphore whose permit count follows the usage tier: the configured
//! maximum while usage is normal, one slot once usage is high. When fewer
//! calls remain than the configured floor, every call is refused.
//!
//! Shrinking the semaphore forgets idle permits immediately; permits that are
//! in use at the time are recorded as debt and retired when released.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};

use super::config::{GovernorConfig, CRITICAL_CHECK_EVERY_N_CALLS};
use super::state::{GovernorState, GovernorStatus, TierTransition};
use crate::error::{Error, Result};
use crate::services::quota::{QuotaProbe, QuotaSnapshot, UsageTier};

/// Quota-aware admission control for upstream calls
///
/// Cheap to clone; all clones share one session's state.
#[derive(Clone)]
pub struct Governor {
    inner: Arc<GovernorInner>,
}

struct GovernorInner {
    state: Mutex<GovernorState>,
    slots: Arc<Semaphore>,
    probe: Option<Arc<dyn QuotaProbe>>,
    /// Serializes quota checks so concurrent triggers share one probe call
    check_gate: AsyncMutex<()>,
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("status", &self.status())
            .field("has_probe", &self.inner.probe.is_some())
            .finish()
    }
}

impl Governor {
    /// Create a governor that never probes quota on its own
    ///
    /// Quota still changes through [`Governor::update_quota`].
    pub fn new(config: GovernorConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a governor that polls `probe` every N governed calls
    pub fn with_probe(config: GovernorConfig, probe: Arc<dyn QuotaProbe>) -> Self {
        Self::build(config, Some(probe))
    }

    fn build(config: GovernorConfig, probe: Option<Arc<dyn QuotaProbe>>) -> Self {
        let state = GovernorState::new(config);
        let slots = Arc::new(Semaphore::new(state.max_concurrent));

        Self {
            inner: Arc::new(GovernorInner {
                state: Mutex::new(state),
                slots,
                probe,
                check_gate: AsyncMutex::new(()),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GovernorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    /// Current status for observability tooling
    pub fn status(&self) -> GovernorStatus {
        self.lock_state().status()
    }

    /// The normalized configuration in effect
    pub fn config(&self) -> GovernorConfig {
        self.lock_state().config().clone()
    }

    /// Current usage tier
    pub fn tier(&self) -> UsageTier {
        self.lock_state().tier
    }

    /// Whether every call is currently refused
    pub fn is_blocked(&self) -> bool {
        self.lock_state().blocked
    }

    /// Whether a quota check is due and none is running
    pub fn should_check(&self) -> bool {
        self.lock_state().should_check()
    }

    /// Most recent quota snapshot
    pub fn last_snapshot(&self) -> Option<QuotaSnapshot> {
        self.lock_state().last_snapshot.clone()
    }

    // ========================================================================
    // Governed execution
    // ========================================================================

    /// Run one unit of upstream work under the current limits
    ///
    /// Fails immediately with [`Error::QuotaExhausted`] while blocked.
    /// Otherwise waits for a free slot in arrival order, then runs `work`.
    /// The slot is released on every exit path, including cancellation.
    pub async fn run<T, F, Fut>(&self, label: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.admit(label)?;

        let permit = Arc::clone(&self.inner.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::internal("governor slots closed"))?;

        slot.start(label, permit)?;
        work().await
    }

    fn admit(&self, label: &str) -> Result<Slot<'_>> {
        let mut state = self.lock_state();

        if state.blocked {
            if self.inner.probe.is_some() && state.recheck_due(Utc::now()) {
                self.spawn_check(&mut state);
            }
            let (remaining, resets_in) = state.exhaustion_details();
            log::warn!(
                "[governor] Refusing '{}': {} calls remaining, resets {}",
                label,
                remaining,
                resets_in
            );
            return Err(Error::quota_exhausted(remaining, resets_in));
        }

        if self.inner.probe.is_some() && state.should_check() {
            log::debug!(
                "[governor] Quota check due after {} calls",
                state.calls_since_check
            );
            self.spawn_check(&mut state);
        }

        state.queue_depth += 1;
        Ok(Slot {
            governor: self,
            permit: None,
            started: false,
        })
    }

    // ========================================================================
    // Quota tracking
    // ========================================================================

    /// Apply a quota snapshot and return the resulting tier
    ///
    /// Resets the call counter. Idempotent: the same snapshot applied twice
    /// leaves the tier and concurrency cap unchanged.
    pub fn update_quota(&self, snapshot: QuotaSnapshot) -> UsageTier {
        let percent = snapshot.percent_used;
        let remaining = snapshot.remaining();

        let transition = {
            let mut state = self.lock_state();
            let transition = state.apply_snapshot(snapshot);
            self.resize_slots(&mut state, transition.previous_max, transition.max_concurrent);
            transition
        };

        log_transition(&transition, percent, remaining);
        transition.to
    }

    fn resize_slots(&self, state: &mut GovernorState, from: usize, to: usize) {
        if to > from {
            let mut grow = to - from;
            let repaid = grow.min(state.permit_debt);
            state.permit_debt -= repaid;
            grow -= repaid;
            if grow > 0 {
                self.inner.slots.add_permits(grow);
            }
        } else if to < from {
            let shrink = from - to;
            let forgotten = self.inner.slots.forget_permits(shrink);
            state.permit_debt += shrink - forgotten;
        }
    }

    /// Probe quota now and wait for the result
    ///
    /// Concurrent callers share a single probe call. Returns the latest
    /// known snapshot; a failed probe leaves the previous one in place.
    pub async fn refresh_quota(&self) -> Option<QuotaSnapshot> {
        if self.inner.probe.is_none() {
            return self.last_snapshot();
        }

        let seen = self.lock_state().checks_completed;
        let _gate = self.inner.check_gate.lock().await;
        let completed = self.lock_state().checks_completed;
        if completed == seen {
            self.probe_once().await;
        }

        self.last_snapshot()
    }

    fn spawn_check(&self, state: &mut GovernorState) {
        state.check_in_flight = true;
        let seen = state.checks_completed;
        let governor = self.clone();
        tokio::spawn(async move {
            governor.background_check(seen).await;
        });
    }

    async fn background_check(&self, seen: u64) {
        let _gate = self.inner.check_gate.lock().await;
        let completed = self.lock_state().checks_completed;
        if completed != seen {
            // an explicit refresh finished while this check waited
            self.lock_state().check_in_flight = false;
            return;
        }
        self.probe_once().await;
    }

    async fn probe_once(&self) {
        let Some(probe) = self.inner.probe.clone() else {
            return;
        };
        let _flight = CheckFlight { governor: self };

        self.lock_state().check_in_flight = true;

        match probe.probe().await {
            Ok(snapshot) => {
                log::debug!(
                    "[governor] Quota check: {}/{} calls used ({:.1}%)",
                    snapshot.used,
                    snapshot.limit,
                    snapshot.percent_used
                );
                self.update_quota(snapshot);
            }
            Err(e) => {
                log::warn!("[governor] Quota check failed, keeping last known usage: {}", e);
            }
        }
    }
}

fn log_transition(transition: &TierTransition, percent: f64, remaining: i64) {
    if !transition.changed() {
        return;
    }

    if transition.from == UsageTier::Blocked {
        log::info!(
            "[governor] Quota recovered: {} calls remaining",
            remaining
        );
    }

    match transition.to {
        UsageTier::Blocked => log::error!(
            "[governor] Quota nearly exhausted ({} calls remaining), refusing requests until usage recovers",
            remaining
        ),
        UsageTier::Critical => log::warn!(
            "[governor] Critical API usage ({:.1}%), serial execution with quota checks every {} calls",
            percent,
            CRITICAL_CHECK_EVERY_N_CALLS
        ),
        UsageTier::HighUsage => log::warn!(
            "[governor] High API usage ({:.1}%), limiting to 1 concurrent request",
            percent
        ),
        UsageTier::Normal => log::info!(
            "[governor] API usage back to normal ({:.1}%), allowing {} concurrent requests",
            percent,
            transition.max_concurrent
        ),
    }
}

// ============================================================================
// Guards
// ============================================================================

/// A caller's place in line, then its execution slot
struct Slot<'a> {
    governor: &'a Governor,
    permit: Option<OwnedSemaphorePermit>,
    started: bool,
}

impl Slot<'_> {
    fn start(&mut self, label: &str, permit: OwnedSemaphorePermit) -> Result<()> {
        self.permit = Some(permit);
        let mut state = self.governor.lock_state();

        // Blocked while this call was queued
        if state.blocked {
            let (remaining, resets_in) = state.exhaustion_details();
            log::warn!("[governor] Refusing queued '{}': quota exhausted", label);
            return Err(Error::quota_exhausted(remaining, resets_in));
        }

        state.queue_depth = state.queue_depth.saturating_sub(1);
        state.active_count += 1;
        state.calls_since_check += 1;
        self.started = true;

        log::debug!(
            "[governor] Running '{}' ({}/{} active, {} queued)",
            label,
            state.active_count,
            state.max_concurrent,
            state.queue_depth
        );
        Ok(())
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let retire = {
            let mut state = self.governor.lock_state();
            if self.started {
                state.active_count = state.active_count.saturating_sub(1);
            } else {
                state.queue_depth = state.queue_depth.saturating_sub(1);
            }
            if self.permit.is_some() && state.permit_debt > 0 {
                state.permit_debt -= 1;
                true
            } else {
                false
            }
        };

        if let Some(permit) = self.permit.take() {
            if retire {
                permit.forget();
            }
        }
    }
}

/// Clears the in-flight flag when a quota check ends, even on panic
struct CheckFlight<'a> {
    governor: &'a Governor,
}

impl Drop for CheckFlight<'_> {
    fn drop(&mut self) {
        self.governor.lock_state().finish_check(Utc::now());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_work_result() {
        let governor = Governor::new(GovernorConfig::default());
        let value = governor.run("answer", || async { Ok(42) }).await.unwrap();

        assert_eq!(value, 42);
        let status = governor.status();
        assert_eq!(status.active_count, 0);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.calls_since_check, 1);
    }

    #[tokio::test]
    async fn test_run_propagates_work_error_and_releases_slot() {
        let governor = Governor::new(GovernorConfig::default());
        let result: Result<()> = governor
            .run("failing", || async { Err(Error::api("HTTP 500")) })
            .await;

        assert!(matches!(result, Err(Error::Api(_))));
        assert_eq!(governor.status().active_count, 0);
        assert_eq!(governor.inner.slots.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_capacity() {
        let config = GovernorConfig {
            max_concurrent: 1,
            ..GovernorConfig::default()
        };
        let governor = Governor::new(config);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let governor = governor.clone();
            tokio::spawn(async move {
                governor
                    .run("holder", || async move {
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        while governor.status().active_count == 0 {
            tokio::task::yield_now().await;
        }

        let waiting = governor.run("abandoned", || async { Ok(()) });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), waiting).await;
        assert!(timed_out.is_err());
        assert_eq!(governor.status().queue_depth, 0);

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();

        governor.run("after", || async { Ok(()) }).await.unwrap();
        assert_eq!(governor.inner.slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_shrink_while_busy_records_debt() {
        let governor = Governor::new(GovernorConfig::default());
        let (release_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let mut holders = Vec::new();
        for i in 0..2 {
            let governor = governor.clone();
            let mut release_rx = release_tx.subscribe();
            holders.push(tokio::spawn(async move {
                governor
                    .run(&format!("holder-{}", i), || async move {
                        let _ = release_rx.recv().await;
                        Ok(())
                    })
                    .await
            }));
        }
        while governor.status().active_count < 2 {
            tokio::task::yield_now().await;
        }

        governor.update_quota(QuotaSnapshot::new(6000, 10000, "within 60 minutes"));
        assert_eq!(governor.lock_state().permit_debt, 1);

        release_tx.send(()).unwrap();
        for holder in holders {
            holder.await.unwrap().unwrap();
        }

        assert_eq!(governor.lock_state().permit_debt, 0);
        assert_eq!(governor.inner.slots.available_permits(), 1);

        governor.update_quota(QuotaSnapshot::new(100, 10000, "within 60 minutes"));
        assert_eq!(governor.inner.slots.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_blocked_refuses_without_queueing() {
        let governor = Governor::new(GovernorConfig::default());
        governor.update_quota(QuotaSnapshot::new(9950, 10000, "within 12 minutes"));

        let err = governor
            .run("refused", || async { Ok(()) })
            .await
            .unwrap_err();

        match err {
            Error::QuotaExhausted {
                remaining,
                resets_in,
            } => {
                assert_eq!(remaining, 50);
                assert_eq!(resets_in, "within 12 minutes");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let status = governor.status();
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.calls_since_check, 0);
    }

    #[tokio::test]
    async fn test_refresh_without_probe_returns_last_snapshot() {
        let governor = Governor::new(GovernorConfig::default());
        assert!(governor.refresh_quota().await.is_none());

        governor.update_quota(QuotaSnapshot::new(10, 10000, "soon"));
        assert_eq!(governor.refresh_quota().await.unwrap().used, 10);
    }
}
