#![allow(clippy::doc_markdown)] // Allow technical terms like DATA_SOURCE, RECORD_ID in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resolver Gateway
//!
//! Engine access coordination and resilience for an entity resolution REST
//! façade.
//!
//! ## Overview
//!
//! The resolution engine is a stateful, fallible native resource reached
//! through a narrow synchronous interface: invoke a named operation, get back
//! a status code, an error code and message on failure, and an output buffer.
//! It can become unusable when its configuration or database connection
//! changes underneath it.
//!
//! This crate multiplexes many concurrent callers onto that resource, detects
//! and recovers from stale configuration without operator intervention, and
//! bounds the concurrency and failure blast radius of bulk ingestion. The
//! HTTP layer itself links against it and is not part of this crate.
//!
//! ## Module Organization
//!
//! - [`registry`] - Operation classifier: name → `Direct | Retryable | Unsupported`
//! - [`resilience`] - Error classes, staleness monitor, retrying caller, background reconciler
//! - [`execution`] - Bounded engine executor and priority dispatch queue
//! - [`bulk`] - Bounded bulk ingest pool and its aggregated result
//! - [`engine`] - Collaborator traits and the engine lifecycle context
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//! - [`test_helpers`] - Scripted engine and authority doubles
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resolver_gateway::config::ConfigManager;
//! use resolver_gateway::engine::{ConfigAuthority, EngineContext, EngineFactory};
//! use resolver_gateway::execution::BoundedEngineExecutor;
//! use resolver_gateway::registry::OperationClassifier;
//! use resolver_gateway::resilience::{ConfigStalenessMonitor, RetryingCaller};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     authority: Arc<dyn ConfigAuthority>,
//! #     factory: Arc<dyn EngineFactory>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let context = Arc::new(EngineContext::new(config.engine.name.clone(), authority));
//! context.initialize()?;
//!
//! let executor = Arc::new(BoundedEngineExecutor::start(factory.as_ref(), config.engine.concurrency)?);
//! let surface = factory.create(0)?.surface();
//! let classifier = Arc::new(OperationClassifier::build(&surface)?);
//! let monitor = Arc::new(ConfigStalenessMonitor::new(
//!     context.clone(),
//!     config.staleness.check_cache_window(),
//! ));
//!
//! let caller = RetryingCaller::new(classifier, executor, monitor);
//! let outcome = caller
//!     .call("get_record", vec![json!("CUSTOMERS"), json!("1001"), json!(0)])
//!     .await?;
//! println!("{}", outcome.payload);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod execution;
pub mod logging;
pub mod registry;
pub mod resilience;
pub mod test_helpers;

pub use bulk::{BulkIngestPool, BulkLoadResult, BulkLoadStatus, BulkProgress, SubmitDecision};
pub use config::{ConfigManager, ConfigurationError, GatewayConfig};
pub use engine::{
    ConfigAuthority, ConfigGeneration, Engine, EngineCapability, EngineContext, EngineFactory,
    NativeOutcome,
};
pub use error::{GatewayError, Result};
pub use execution::{BoundedEngineExecutor, PriorityDispatchQueue, PriorityTier};
pub use logging::init_structured_logging;
pub use registry::{OperationClassifier, OperationDescriptor, OperationPolicy};
pub use resilience::{
    BackgroundReconciler, CallOutcome, CallRoute, ConfigStalenessMonitor, ErrorClass,
    RefreshOutcome, RetryingCaller, StalenessCheck,
};
