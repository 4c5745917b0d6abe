//! # Config Staleness Monitor
//!
//! Compares the generation the engine has loaded with the generation the
//! configuration authority designates as default, and reinitializes the engine
//! when they differ.
//!
//! Checks are serialised behind one async mutex. A caller that queued behind a
//! check already in flight does not start another one: it returns the outcome
//! of the check it waited for, so a storm of failing requests collapses into a
//! single reinitialize.
//!
//! ```rust
//! use resolver_gateway::engine::{ConfigGeneration, EngineContext};
//! use resolver_gateway::resilience::{ConfigStalenessMonitor, StalenessCheck};
//! use resolver_gateway::test_helpers::ScriptedAuthority;
//! use resolver_gateway::RefreshOutcome;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let authority = Arc::new(ScriptedAuthority::new(ConfigGeneration(1)));
//! let context = Arc::new(EngineContext::new("docs", authority.clone()));
//! context.initialize().unwrap();
//!
//! let monitor = ConfigStalenessMonitor::new(context, Duration::ZERO);
//! authority.set_default_generation(ConfigGeneration(2));
//! assert_eq!(monitor.ensure_current(true).await, RefreshOutcome::Refreshed);
//! assert_eq!(monitor.ensure_current(true).await, RefreshOutcome::Unchanged);
//! # });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::EngineContext;

/// Result of an `ensure_current` check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Engine already runs the default generation
    Unchanged,
    /// Engine was stale and has been reinitialized
    Refreshed,
    /// Generations could not be read or the reinitialize failed
    Failed,
}

/// Anything that can bring the engine configuration up to date
#[async_trait]
pub trait StalenessCheck: Send + Sync {
    /// Ensure the engine runs the current configuration generation.
    ///
    /// `force_check` bypasses any cached "recently verified" state.
    async fn ensure_current(&self, force_check: bool) -> RefreshOutcome;
}

/// Counters describing monitor activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StalenessStats {
    pub checks_performed: u64,
    pub refreshes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub shared_outcomes: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    checks_performed: AtomicU64,
    refreshes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    shared_outcomes: AtomicU64,
}

#[derive(Debug)]
struct CheckState {
    last_verified: Option<Instant>,
    last_outcome: RefreshOutcome,
}

/// Shared monitor for one engine context
#[derive(Debug)]
pub struct ConfigStalenessMonitor {
    context: Arc<EngineContext>,
    check_cache_window: Duration,
    state: Mutex<CheckState>,
    /// Number of checks that actually reached the authority
    completed_checks: AtomicU64,
    counters: StatsCounters,
}

impl ConfigStalenessMonitor {
    pub fn new(context: Arc<EngineContext>, check_cache_window: Duration) -> Self {
        info!(
            engine = %context.name(),
            cache_window_ms = check_cache_window.as_millis() as u64,
            "🛡️ Config staleness monitor initialized"
        );

        Self {
            context,
            check_cache_window,
            state: Mutex::new(CheckState {
                last_verified: None,
                last_outcome: RefreshOutcome::Unchanged,
            }),
            completed_checks: AtomicU64::new(0),
            counters: StatsCounters::default(),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn stats(&self) -> StalenessStats {
        StalenessStats {
            checks_performed: self.counters.checks_performed.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            shared_outcomes: self.counters.shared_outcomes.load(Ordering::Relaxed),
        }
    }

    async fn check(&self, force_check: bool) -> RefreshOutcome {
        let observed = self.completed_checks.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if self.completed_checks.load(Ordering::Acquire) != observed {
            self.counters.shared_outcomes.fetch_add(1, Ordering::Relaxed);
            debug!(
                outcome = ?state.last_outcome,
                "Observed outcome of a check completed while waiting"
            );
            return state.last_outcome;
        }

        if !force_check {
            if let Some(verified) = state.last_verified {
                if verified.elapsed() < self.check_cache_window {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return RefreshOutcome::Unchanged;
                }
            }
        }

        let context = Arc::clone(&self.context);
        let outcome = match tokio::task::spawn_blocking(move || check_and_refresh(&context)).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "❌ STALENESS: Check task did not complete");
                RefreshOutcome::Failed
            }
        };

        self.counters.checks_performed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RefreshOutcome::Refreshed => {
                self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                state.last_verified = Some(Instant::now());
            }
            RefreshOutcome::Unchanged => {
                state.last_verified = Some(Instant::now());
            }
            RefreshOutcome::Failed => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                state.last_verified = None;
            }
        }
        state.last_outcome = outcome;
        self.completed_checks.fetch_add(1, Ordering::Release);

        outcome
    }
}

#[async_trait]
impl StalenessCheck for ConfigStalenessMonitor {
    async fn ensure_current(&self, force_check: bool) -> RefreshOutcome {
        self.check(force_check).await
    }
}

/// Blocking generation comparison and refresh against the authority
fn check_and_refresh(context: &EngineContext) -> RefreshOutcome {
    let active = match context.active_generation() {
        Ok(generation) => generation,
        Err(e) => {
            warn!(engine = %context.name(), error = %e, "Unable to read active config generation");
            return RefreshOutcome::Failed;
        }
    };
    let default = match context.default_generation() {
        Ok(generation) => generation,
        Err(e) => {
            warn!(engine = %context.name(), error = %e, "Unable to read default config generation");
            return RefreshOutcome::Failed;
        }
    };

    if active == default {
        debug!(engine = %context.name(), generation = %active, "Engine config is current");
        return RefreshOutcome::Unchanged;
    }

    info!(
        engine = %context.name(),
        active = %active,
        default = %default,
        "🔄 STALENESS: Engine config is stale, reinitializing"
    );

    match context.reinitialize(default) {
        Ok(()) => RefreshOutcome::Refreshed,
        Err(e) => {
            error!(
                engine = %context.name(),
                target = %default,
                error = %e,
                "❌ STALENESS: Failed to refresh engine config"
            );
            RefreshOutcome::Failed
        }
    }
}
