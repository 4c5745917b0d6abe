//! Shared setup for integration tests.

#![allow(dead_code)]

pub mod strategies;

use resolver_gateway::config::WorkerProfile;
use resolver_gateway::engine::EngineCapability;
use resolver_gateway::test_helpers::EngineScript;
use std::sync::{Arc, Once};
use std::time::Duration;

static LOGGING: Once = Once::new();

/// Route test logs through the test writer once per binary; `RUST_LOG` controls the level
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn new_script() -> Arc<EngineScript> {
    init_test_logging();
    Arc::new(EngineScript::new())
}

/// One bulk input line for `data_source`/`record_id`
pub fn record_line(data_source: &str, record_id: u64) -> String {
    serde_json::json!({
        "DATA_SOURCE": data_source,
        "RECORD_ID": record_id.to_string(),
        "NAME_FULL": format!("Person {record_id}"),
    })
    .to_string()
}

pub fn all_capabilities(worker_id: usize) -> WorkerProfile {
    WorkerProfile {
        worker_id,
        capabilities: vec![
            EngineCapability::Resolver,
            EngineCapability::Auditor,
            EngineCapability::Query,
        ],
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
