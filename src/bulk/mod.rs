//! # Bulk Ingest
//!
//! Loads a stream of JSON records through `add_record` with a bounded number
//! of outstanding calls, producing an aggregated [`BulkLoadResult`].
//!
//! Records that cannot be parsed or lack their identifiers are counted
//! *incomplete* without reaching the engine. Engine failures are counted
//! *failed*. Both count towards the optional abort threshold, and every record
//! read ends up in exactly one of loaded, failed or incomplete.
//!
//! ```rust,no_run
//! use resolver_gateway::bulk::BulkIngestPool;
//! use resolver_gateway::config::BulkConfig;
//! use resolver_gateway::resilience::RetryingCaller;
//! use std::sync::Arc;
//!
//! # async fn example(caller: Arc<RetryingCaller>, lines: Vec<String>) {
//! let pool = BulkIngestPool::new(caller, &BulkConfig::default());
//! let result = pool.ingest_all(lines).await;
//! println!("loaded {} of {}", result.loaded, result.records_read);
//! # }
//! ```

pub mod pool;
pub mod record;
pub mod result;

pub use pool::{BulkIngestPool, SubmitDecision};
pub use record::{parse_record, record_from_value, BulkRecord, IncompleteReason};
pub use result::{BulkLoadResult, BulkLoadStatus, BulkProgress, DataSourceCounts, FailureDetail};
