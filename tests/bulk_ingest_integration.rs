//! Bulk ingest through the full stack: pool → retrying caller → executor.

mod common;

use resolver_gateway::bulk::{BulkIngestPool, BulkLoadStatus, SubmitDecision};
use resolver_gateway::config::BulkConfig;
use resolver_gateway::constants::error_codes::{
    DATABASE_CONNECTION_LOST, MISSING_REQUIRED_FIELD, UNKNOWN_DATA_SOURCE,
};
use resolver_gateway::constants::operations as ops;
use resolver_gateway::resilience::ErrorClass;
use resolver_gateway::test_helpers::{scripted_gateway, ScriptedResponse};
use std::time::Duration;

fn bulk_config(concurrency: usize, max_failures: i64) -> BulkConfig {
    BulkConfig {
        concurrency,
        max_failures,
        progress_interval_ms: 10,
        failure_ledger_size: 100,
        default_data_source: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_record_is_accounted_for() {
    let script = common::new_script();
    script.set_responder(|_operation, args| {
        let record_id: u64 = args[1].as_str()?.parse().ok()?;
        match record_id % 10 {
            3 => Some(ScriptedResponse::failure(MISSING_REQUIRED_FIELD, "missing NAME")),
            7 => Some(ScriptedResponse::failure(UNKNOWN_DATA_SOURCE, "unknown data source")),
            _ => Some(ScriptedResponse::success("").with_delay(Duration::from_millis(1))),
        }
    });
    let gateway = scripted_gateway(&script, 4);

    let mut lines: Vec<String> = (1..=100)
        .map(|i| common::record_line("CUSTOMERS", i))
        .collect();
    lines.push("not json at all".to_string());
    lines.push(r#"{"DATA_SOURCE": "CUSTOMERS"}"#.to_string());

    let pool = BulkIngestPool::new(gateway.caller.clone(), &bulk_config(8, -1));
    let result = pool.ingest_all(&lines).await;

    assert_eq!(result.status, BulkLoadStatus::Completed);
    assert_eq!(result.records_read, 102);
    assert_eq!(result.loaded, 80);
    assert_eq!(result.failed, 20);
    assert_eq!(result.incomplete, 2);
    assert!(result.is_fully_accounted());
    assert_eq!(result.error_codes.get(&MISSING_REQUIRED_FIELD), Some(&10));
    assert_eq!(result.error_codes.get(&UNKNOWN_DATA_SOURCE), Some(&10));
    assert!(result
        .failures
        .iter()
        .filter(|f| f.error_code.is_some())
        .all(|f| f.error_class == Some(ErrorClass::Validation)));
    assert!(result.finished_at.is_some());
}

#[tokio::test]
async fn test_abort_after_third_failure() {
    let script = common::new_script();
    script.set_responder(|_operation, args| {
        let record_id: u64 = args[1].as_str()?.parse().ok()?;
        if record_id % 2 == 1 {
            Some(ScriptedResponse::failure(MISSING_REQUIRED_FIELD, "missing NAME"))
        } else {
            None
        }
    });
    let gateway = scripted_gateway(&script, 1);

    // Bulk concurrency 1 makes every outcome known before the next submit
    let mut pool = BulkIngestPool::new(gateway.caller.clone(), &bulk_config(1, 2));
    let mut decisions = Vec::new();
    for i in 1..=8 {
        decisions.push(pool.submit(&common::record_line("CUSTOMERS", i)).await);
    }
    let result = pool.drain().await;

    // Records 1, 3 and 5 fail; the third failure is reaped when record 6 is offered
    assert!(decisions[..5]
        .iter()
        .all(|d| matches!(d, SubmitDecision::Accepted(_))));
    assert!(decisions[5..].iter().all(|d| *d == SubmitDecision::Rejected));
    assert_eq!(result.status, BulkLoadStatus::Aborted);
    assert_eq!(result.failed, 3);
    assert_eq!(result.loaded, 2);
    assert_eq!(result.records_read, 5);
    assert!(result.is_fully_accounted());
    assert_eq!(script.invocations(ops::ADD_RECORD), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_calls_are_drained_after_abort() {
    let script = common::new_script();
    script.set_responder(|_operation, _args| {
        Some(
            ScriptedResponse::failure(MISSING_REQUIRED_FIELD, "missing NAME")
                .with_delay(Duration::from_millis(5)),
        )
    });
    let gateway = scripted_gateway(&script, 4);

    let pool = BulkIngestPool::new(gateway.caller.clone(), &bulk_config(4, 0));
    let result = pool
        .ingest_all((1..=50).map(|i| common::record_line("CUSTOMERS", i)))
        .await;

    assert_eq!(result.status, BulkLoadStatus::Aborted);
    // Everything handed to the engine was reaped, nothing more was read
    assert_eq!(result.records_read, script.invocations(ops::ADD_RECORD) as u64);
    assert!(result.records_read < 50);
    assert!(result.is_fully_accounted());
}

#[tokio::test]
async fn test_transient_failures_recover_through_retry() {
    let script = common::new_script();
    script.push(
        ops::ADD_RECORD,
        ScriptedResponse::failure(DATABASE_CONNECTION_LOST, "connection lost"),
    );
    let gateway = scripted_gateway(&script, 2);

    let pool = BulkIngestPool::new(gateway.caller.clone(), &bulk_config(2, 0));
    let result = pool
        .ingest_all((1..=5).map(|i| common::record_line("WATCHLIST", i)))
        .await;

    assert_eq!(result.status, BulkLoadStatus::Completed);
    assert_eq!(result.loaded, 5);
    assert_eq!(result.by_data_source["WATCHLIST"].loaded, 5);
    assert_eq!(script.invocations(ops::ADD_RECORD), 6);
    assert_eq!(gateway.caller.stats().recovered, 1);
}

#[tokio::test]
async fn test_default_data_source_fills_gaps() {
    let script = common::new_script();
    let gateway = scripted_gateway(&script, 1);
    let mut config = bulk_config(2, -1);
    config.default_data_source = Some("REFERENCE".to_string());

    let pool = BulkIngestPool::new(gateway.caller.clone(), &config);
    let result = pool
        .ingest_all([r#"{"RECORD_ID": "1"}"#, r#"{"RECORD_ID": 2}"#])
        .await;

    assert_eq!(result.loaded, 2);
    assert_eq!(result.by_data_source["REFERENCE"].loaded, 2);
}
