//! # Background Reconciler
//!
//! Long-lived task that periodically forces a staleness check so the engine
//! picks up a new default configuration generation even when no request
//! fails. Consecutive failed checks are tolerated up to a limit, after which
//! the loop gives up for good and logs an error.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::staleness::{RefreshOutcome, StalenessCheck};
use crate::config::ReconcilerConfig;
use crate::error::{GatewayError, Result};
use crate::logging::log_refresh_event;

/// Lifecycle of the reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerState {
    Running = 0,
    /// Stopped on request
    Stopped = 1,
    /// Gave up after too many consecutive failures
    Abandoned = 2,
}

impl From<u8> for ReconcilerState {
    fn from(value: u8) -> Self {
        match value {
            0 => ReconcilerState::Running,
            1 => ReconcilerState::Stopped,
            _ => ReconcilerState::Abandoned,
        }
    }
}

#[derive(Debug)]
struct LoopState {
    running: AtomicBool,
    wake: Notify,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
}

/// Handle onto a spawned reconciliation loop
#[derive(Debug)]
pub struct BackgroundReconciler {
    shared: Arc<LoopState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundReconciler {
    /// Spawn the loop on the current tokio runtime
    pub fn spawn(check: Arc<dyn StalenessCheck>, config: &ReconcilerConfig) -> Self {
        let shared = Arc::new(LoopState {
            running: AtomicBool::new(true),
            wake: Notify::new(),
            state: AtomicU8::new(ReconcilerState::Running as u8),
            consecutive_failures: AtomicU32::new(0),
        });

        let period = config.period();
        let max_failures = config.max_consecutive_failures;

        info!(
            period_seconds = period.as_secs(),
            max_consecutive_failures = max_failures,
            "🔄 RECONCILER: Starting background reconciliation"
        );

        let handle = tokio::spawn(run(Arc::clone(&shared), check, period, max_failures));

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        ReconcilerState::from(self.shared.state.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::Acquire)
    }

    /// Cut the current sleep short without requesting a stop.
    ///
    /// The loop treats this as a transient failure.
    pub fn interrupt(&self) {
        self.shared.wake.notify_one();
    }

    /// Request a stop and wait up to `timeout` for the loop to exit
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();

        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::Lifecycle(format!(
                "reconciler task did not complete: {e}"
            ))),
            Err(_) => Err(GatewayError::Timeout {
                operation: "reconciler stop".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Drop for BackgroundReconciler {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

async fn run(
    shared: Arc<LoopState>,
    check: Arc<dyn StalenessCheck>,
    period: Duration,
    max_failures: u32,
) {
    loop {
        let woken_early = tokio::select! {
            _ = tokio::time::sleep(period) => false,
            _ = shared.wake.notified() => true,
        };

        if !shared.running.load(Ordering::Acquire) {
            debug!("Reconciler stop requested");
            shared
                .state
                .store(ReconcilerState::Stopped as u8, Ordering::Release);
            break;
        }

        let failed = if woken_early {
            warn!("Reconciler sleep interrupted without a stop request");
            true
        } else {
            let outcome = check.ensure_current(true).await;
            if outcome != RefreshOutcome::Unchanged {
                log_refresh_event("reconciler", true, &format!("{outcome:?}"), None);
            }
            outcome == RefreshOutcome::Failed
        };

        if !failed {
            shared.consecutive_failures.store(0, Ordering::Release);
            continue;
        }

        let failures = shared.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        warn!(
            consecutive_failures = failures,
            max_consecutive_failures = max_failures,
            "⚠️ RECONCILER: Reconciliation attempt failed"
        );

        if failures > max_failures {
            error!(
                consecutive_failures = failures,
                "❌ RECONCILER: Too many consecutive failures, abandoning background reconciliation"
            );
            shared
                .state
                .store(ReconcilerState::Abandoned as u8, Ordering::Release);
            break;
        }
    }

    shared.running.store(false, Ordering::Release);
    let state = ReconcilerState::from(shared.state.load(Ordering::Acquire));
    info!(state = ?state, "Reconciler loop ended");
}
