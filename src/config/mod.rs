//! # Gateway Configuration
//!
//! Typed configuration for engine access: slot counts, refresh cadence,
//! bulk-load limits and the dispatch worker layout.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults ([`GatewayConfig::default`])
//! 2. `config/gateway.toml`
//! 3. `config/gateway.{environment}.toml`
//! 4. `GATEWAY__*` environment variables, `__` separating nested keys
//!    (`GATEWAY__ENGINE__CONCURRENCY=16`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resolver_gateway::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let slots = manager.config().engine.concurrency;
//! let period = manager.config().reconciler.period();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::constants::defaults;
use crate::engine::EngineCapability;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub engine: EngineConfig,
    pub reconciler: ReconcilerConfig,
    pub staleness: StalenessConfig,
    pub bulk: BulkConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instance name used in logs
    pub name: String,
    /// Number of executor slots, each owning one engine handle
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "resolver-gateway".to_string(),
            concurrency: defaults::ENGINE_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub period_seconds: u64,
    /// Failed checks tolerated in a row before the reconciler gives up
    pub max_consecutive_failures: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_seconds: defaults::RECONCILE_PERIOD_SECONDS,
            max_consecutive_failures: defaults::MAX_CONSECUTIVE_RECONCILE_FAILURES,
        }
    }
}

impl ReconcilerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    /// How long a successful check satisfies unforced checks
    pub check_cache_window_ms: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            check_cache_window_ms: defaults::STALENESS_CHECK_CACHE_WINDOW_MS,
        }
    }
}

impl StalenessConfig {
    pub fn check_cache_window(&self) -> Duration {
        Duration::from_millis(self.check_cache_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Outstanding `add_record` calls per ingest job
    pub concurrency: usize,
    /// Negative means unlimited
    pub max_failures: i64,
    pub progress_interval_ms: u64,
    /// Failure details retained per job
    pub failure_ledger_size: usize,
    /// Data source applied to records that do not name one
    pub default_data_source: Option<String>,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::BULK_CONCURRENCY,
            max_failures: defaults::BULK_MAX_FAILURES,
            progress_interval_ms: defaults::BULK_PROGRESS_INTERVAL_MS,
            failure_ledger_size: defaults::BULK_FAILURE_LEDGER_SIZE,
            default_data_source: None,
        }
    }
}

impl BulkConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// One dispatch worker: affinity id plus the capabilities it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub worker_id: usize,
    pub capabilities: Vec<EngineCapability>,
}

impl WorkerProfile {
    pub fn serves(&self, capability: EngineCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub workers: Vec<WorkerProfile>,
    pub result_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let all = vec![
            EngineCapability::Resolver,
            EngineCapability::Auditor,
            EngineCapability::Query,
        ];
        Self {
            workers: (0..defaults::ENGINE_CONCURRENCY)
                .map(|worker_id| WorkerProfile {
                    worker_id,
                    capabilities: all.clone(),
                })
                .collect(),
            result_timeout_ms: defaults::DISPATCH_RESULT_TIMEOUT_MS,
        }
    }
}

impl DispatchConfig {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

impl GatewayConfig {
    /// Check cross-field constraints the type system cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.concurrency",
                "0",
                "must be at least 1",
            ));
        }
        if self.bulk.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "bulk.concurrency",
                "0",
                "must be at least 1",
            ));
        }
        if self.bulk.progress_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "bulk.progress_interval_ms",
                "0",
                "must be greater than zero",
            ));
        }
        if self.reconciler.enabled && self.reconciler.period_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "reconciler.period_seconds",
                "0",
                "must be greater than zero when the reconciler is enabled",
            ));
        }
        if self.dispatch.result_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.result_timeout_ms",
                "0",
                "must be greater than zero",
            ));
        }

        if self.dispatch.workers.is_empty() {
            return Err(ConfigurationError::validation_error(
                "dispatch.workers must define at least one worker",
            ));
        }
        let mut seen = HashSet::new();
        for worker in &self.dispatch.workers {
            if !seen.insert(worker.worker_id) {
                return Err(ConfigurationError::validation_error(format!(
                    "dispatch worker id {} is defined more than once",
                    worker.worker_id
                )));
            }
            if worker.capabilities.is_empty() {
                return Err(ConfigurationError::validation_error(format!(
                    "dispatch worker {} serves no capabilities",
                    worker.worker_id
                )));
            }
        }
        for capability in [
            EngineCapability::Resolver,
            EngineCapability::Auditor,
            EngineCapability::Query,
        ] {
            if !self.dispatch.workers.iter().any(|w| w.serves(capability)) {
                tracing::warn!(
                    capability = capability.name(),
                    "No dispatch worker serves this capability; its operations cannot be dispatched"
                );
            }
        }

        Ok(())
    }
}
