//! # Bulk Ingest Worker Pool
//!
//! Bounded submit-one/reap-one pipeline loading records through the
//! [`RetryingCaller`]. At most `concurrency` `add_record` calls are
//! outstanding; once saturated, `submit` first waits for the oldest one.
//! Results are folded into the [`BulkLoadResult`] by the pool itself, never
//! by the spawned tasks.
//!
//! With `max_failures >= 0` the job stops accepting records as soon as
//! `failed + incomplete` exceeds the threshold. Calls already handed out are
//! still awaited; nothing in flight is cancelled.

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::record::{parse_record, record_from_value, BulkRecord, IncompleteReason};
use super::result::{BulkLoadResult, BulkLoadStatus, BulkProgress, FailureDetail};
use crate::config::BulkConfig;
use crate::constants::operations::ADD_RECORD;
use crate::error::{GatewayError, Result};
use crate::logging::log_bulk_progress;
use crate::resilience::{CallOutcome, RetryingCaller};

/// What happened to a submitted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Handed to the engine; carries the record's input position
    Accepted(u64),
    /// Counted incomplete without touching the engine
    Incomplete(IncompleteReason),
    /// Job already aborted; the record was not read
    Rejected,
}

struct InFlight {
    sequence: u64,
    data_source: String,
    record_id: String,
    handle: JoinHandle<Result<CallOutcome>>,
}

/// Coordinator for one ingest job
pub struct BulkIngestPool {
    caller: Arc<RetryingCaller>,
    concurrency: usize,
    max_failures: i64,
    progress_interval: Duration,
    default_data_source: Option<String>,
    in_flight: VecDeque<InFlight>,
    result: BulkLoadResult,
    progress: watch::Sender<BulkProgress>,
    last_progress: Instant,
}

impl std::fmt::Debug for BulkIngestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkIngestPool")
            .field("job_id", &self.result.job_id)
            .field("concurrency", &self.concurrency)
            .field("in_flight", &self.in_flight.len())
            .field("status", &self.result.status)
            .finish()
    }
}

impl BulkIngestPool {
    pub fn new(caller: Arc<RetryingCaller>, config: &BulkConfig) -> Self {
        let job_id = Uuid::new_v4();
        let result = BulkLoadResult::new(job_id, config.failure_ledger_size);
        let (progress, _) = watch::channel(BulkProgress::snapshot(&result, 0));

        info!(
            job_id = %job_id,
            concurrency = config.concurrency,
            max_failures = config.max_failures,
            "📦 BULK: Ingest job started"
        );

        Self {
            caller,
            concurrency: config.concurrency.max(1),
            max_failures: config.max_failures,
            progress_interval: config.progress_interval(),
            default_data_source: config.default_data_source.clone(),
            in_flight: VecDeque::with_capacity(config.concurrency),
            result,
            progress,
            last_progress: Instant::now(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.result.job_id
    }

    /// Receiver for progress snapshots; never blocks ingestion
    pub fn subscribe(&self) -> watch::Receiver<BulkProgress> {
        self.progress.subscribe()
    }

    pub fn status(&self) -> BulkLoadStatus {
        self.result.status
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Submit one raw JSON record line
    pub async fn submit(&mut self, raw: &str) -> SubmitDecision {
        let default_ds = self.default_data_source.clone();
        self.submit_parsed(|| parse_record(raw, default_ds.as_deref()))
            .await
    }

    /// Submit one already parsed record
    pub async fn submit_value(&mut self, value: Value) -> SubmitDecision {
        let default_ds = self.default_data_source.clone();
        self.submit_parsed(move || record_from_value(value, default_ds.as_deref()))
            .await
    }

    async fn submit_parsed<P>(&mut self, parse: P) -> SubmitDecision
    where
        P: FnOnce() -> std::result::Result<BulkRecord, IncompleteReason>,
    {
        while self.in_flight.len() >= self.concurrency {
            self.reap_oldest().await;
        }
        if self.result.status == BulkLoadStatus::Aborted {
            return SubmitDecision::Rejected;
        }

        let sequence = self.result.record_read();
        let decision = match parse() {
            Ok(record) => {
                self.spawn(sequence, record);
                SubmitDecision::Accepted(sequence)
            }
            Err(reason) => {
                debug!(sequence = sequence, reason = %reason, "Record counted incomplete");
                self.result.record_incomplete(FailureDetail {
                    sequence,
                    data_source: None,
                    record_id: None,
                    error_class: None,
                    error_code: None,
                    message: reason.to_string(),
                });
                self.check_threshold();
                SubmitDecision::Incomplete(reason)
            }
        };

        self.maybe_publish_progress();
        decision
    }

    fn spawn(&mut self, sequence: u64, record: BulkRecord) {
        let caller = Arc::clone(&self.caller);
        let args = vec![
            json!(record.data_source),
            json!(record.record_id),
            record.definition,
            json!(0),
        ];
        let handle = tokio::spawn(async move { caller.call(ADD_RECORD, args).await });

        self.in_flight.push_back(InFlight {
            sequence,
            data_source: record.data_source,
            record_id: record.record_id,
            handle,
        });
    }

    async fn reap_oldest(&mut self) {
        let Some(task) = self.in_flight.pop_front() else {
            return;
        };

        let failure = match task.handle.await {
            Ok(Ok(outcome)) if outcome.is_success() => None,
            Ok(Ok(outcome)) => Some((
                Some(crate::resilience::classify_native_code(outcome.error_code)),
                Some(outcome.error_code),
                outcome.error_message,
            )),
            Ok(Err(e)) => {
                let code = match &e {
                    GatewayError::Engine { code, .. } => Some(*code),
                    _ => None,
                };
                Some((Some(e.class()), code, e.to_string()))
            }
            Err(e) => Some((None, None, format!("ingest task did not complete: {e}"))),
        };

        match failure {
            None => self.result.record_loaded(&task.data_source),
            Some((error_class, error_code, message)) => {
                debug!(
                    sequence = task.sequence,
                    record_id = %task.record_id,
                    error_code = ?error_code,
                    "Record failed to load"
                );
                self.result.record_failed(FailureDetail {
                    sequence: task.sequence,
                    data_source: Some(task.data_source),
                    record_id: Some(task.record_id),
                    error_class,
                    error_code,
                    message,
                });
                self.check_threshold();
            }
        }
    }

    fn check_threshold(&mut self) {
        if self.max_failures < 0 || self.result.status != BulkLoadStatus::Running {
            return;
        }
        if self.result.failure_count() > self.max_failures as u64 {
            warn!(
                job_id = %self.result.job_id,
                failed = self.result.failed,
                incomplete = self.result.incomplete,
                max_failures = self.max_failures,
                "⚠️ BULK: Failure threshold exceeded, no further records will be submitted"
            );
            self.result.status = BulkLoadStatus::Aborted;
            self.publish_progress();
        }
    }

    fn maybe_publish_progress(&mut self) {
        if self.last_progress.elapsed() >= self.progress_interval {
            self.publish_progress();
        }
    }

    fn publish_progress(&mut self) {
        self.last_progress = Instant::now();
        let snapshot = BulkProgress::snapshot(&self.result, self.in_flight.len());
        log_bulk_progress(
            &snapshot.job_id.to_string(),
            snapshot.records_read,
            snapshot.loaded,
            snapshot.failed,
            snapshot.incomplete,
            snapshot.status.as_str(),
        );
        self.progress.send_replace(snapshot);
    }

    /// Reap every outstanding call in submission order and close the job
    pub async fn drain(mut self) -> BulkLoadResult {
        while !self.in_flight.is_empty() {
            self.reap_oldest().await;
            self.maybe_publish_progress();
        }

        let status = match self.result.status {
            BulkLoadStatus::Aborted => BulkLoadStatus::Aborted,
            _ => BulkLoadStatus::Completed,
        };
        self.result.finish(status);
        self.publish_progress();

        info!(
            job_id = %self.result.job_id,
            status = status.as_str(),
            records_read = self.result.records_read,
            loaded = self.result.loaded,
            failed = self.result.failed,
            incomplete = self.result.incomplete,
            duration_ms = self.result.duration_ms(),
            "📦 BULK: Ingest job finished"
        );

        self.result
    }

    /// Submit every record until the input ends or the job aborts, then drain
    pub async fn ingest_all<I, S>(mut self, records: I) -> BulkLoadResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in records {
            if self.submit(raw.as_ref()).await == SubmitDecision::Rejected {
                break;
            }
        }
        self.drain().await
    }
}
