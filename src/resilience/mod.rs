//! # Resilience Module
//!
//! Detection of and recovery from stale engine state.
//!
//! ## Architecture
//!
//! - **Error classification**: native error codes map onto a small [`ErrorClass`] taxonomy
//! - **Staleness monitor**: compares loaded and default configuration generations and
//!   reinitializes the engine, one refresh at a time
//! - **Retrying caller**: refreshes and retries a failed call at most once
//! - **Background reconciler**: proactive periodic refresh with bounded failure tolerance
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resolver_gateway::resilience::{ConfigStalenessMonitor, RefreshOutcome, StalenessCheck};
//! use resolver_gateway::engine::EngineContext;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(context: Arc<EngineContext>) {
//! let monitor = ConfigStalenessMonitor::new(context, Duration::from_secs(10));
//! if monitor.ensure_current(true).await == RefreshOutcome::Refreshed {
//!     println!("engine picked up the new default configuration");
//! }
//! # }
//! ```

pub mod error_classifier;
pub mod reconciler;
pub mod retry;
pub mod staleness;

pub use error_classifier::{classify_native_code, ErrorClass};
pub use reconciler::{BackgroundReconciler, ReconcilerState};
pub use retry::{CallOutcome, CallRoute, EngineInvoker, RetryStats, RetryingCaller};
pub use staleness::{ConfigStalenessMonitor, RefreshOutcome, StalenessCheck, StalenessStats};
