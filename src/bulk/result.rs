//! Aggregated outcome of one bulk ingest job.
//!
//! Only the coordinating [`BulkIngestPool`](super::BulkIngestPool) mutates a
//! [`BulkLoadResult`]; spawned tasks hand their outcomes back to it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::resilience::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkLoadStatus {
    Running,
    Completed,
    Aborted,
}

impl BulkLoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkLoadStatus::Running => "running",
            BulkLoadStatus::Completed => "completed",
            BulkLoadStatus::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSourceCounts {
    pub loaded: u64,
    pub failed: u64,
}

/// One entry in the failure ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Position of the record in the input, starting at 1
    pub sequence: u64,
    pub data_source: Option<String>,
    pub record_id: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub error_code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkLoadResult {
    pub job_id: Uuid,
    pub status: BulkLoadStatus,
    pub records_read: u64,
    pub loaded: u64,
    pub failed: u64,
    pub incomplete: u64,
    pub by_data_source: BTreeMap<String, DataSourceCounts>,
    /// First failures of the job, capped at the configured ledger size
    pub failures: Vec<FailureDetail>,
    /// Failures that did not fit in the ledger
    pub failures_dropped: u64,
    /// Native error code → number of failed records
    pub error_codes: BTreeMap<i64, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    ledger_size: usize,
}

impl BulkLoadResult {
    pub fn new(job_id: Uuid, ledger_size: usize) -> Self {
        Self {
            job_id,
            status: BulkLoadStatus::Running,
            records_read: 0,
            loaded: 0,
            failed: 0,
            incomplete: 0,
            by_data_source: BTreeMap::new(),
            failures: Vec::new(),
            failures_dropped: 0,
            error_codes: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            ledger_size,
        }
    }

    pub(crate) fn record_read(&mut self) -> u64 {
        self.records_read += 1;
        self.records_read
    }

    pub(crate) fn record_loaded(&mut self, data_source: &str) {
        self.loaded += 1;
        self.by_data_source
            .entry(data_source.to_string())
            .or_default()
            .loaded += 1;
    }

    pub(crate) fn record_failed(&mut self, detail: FailureDetail) {
        self.failed += 1;
        if let Some(ds) = &detail.data_source {
            self.by_data_source.entry(ds.clone()).or_default().failed += 1;
        }
        if let Some(code) = detail.error_code {
            *self.error_codes.entry(code).or_insert(0) += 1;
        }
        self.push_detail(detail);
    }

    pub(crate) fn record_incomplete(&mut self, detail: FailureDetail) {
        self.incomplete += 1;
        self.push_detail(detail);
    }

    fn push_detail(&mut self, detail: FailureDetail) {
        if self.failures.len() < self.ledger_size {
            self.failures.push(detail);
        } else {
            self.failures_dropped += 1;
        }
    }

    /// Failures that count towards the abort threshold
    pub fn failure_count(&self) -> u64 {
        self.failed + self.incomplete
    }

    /// Every record read has been classified
    pub fn is_fully_accounted(&self) -> bool {
        self.loaded + self.failed + self.incomplete == self.records_read
    }

    pub(crate) fn finish(&mut self, status: BulkLoadStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }
}

/// Progress snapshot published while a job runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkProgress {
    pub job_id: Uuid,
    pub status: BulkLoadStatus,
    pub records_read: u64,
    pub loaded: u64,
    pub failed: u64,
    pub incomplete: u64,
    pub in_flight: usize,
}

impl BulkProgress {
    pub(crate) fn snapshot(result: &BulkLoadResult, in_flight: usize) -> Self {
        Self {
            job_id: result.job_id,
            status: result.status,
            records_read: result.records_read,
            loaded: result.loaded,
            failed: result.failed,
            incomplete: result.incomplete,
            in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(sequence: u64, code: Option<i64>) -> FailureDetail {
        FailureDetail {
            sequence,
            data_source: Some("CUSTOMERS".to_string()),
            record_id: Some(sequence.to_string()),
            error_class: code.map(crate::resilience::classify_native_code),
            error_code: code,
            message: "failed".to_string(),
        }
    }

    #[test]
    fn test_ledger_is_capped() {
        let mut result = BulkLoadResult::new(Uuid::new_v4(), 2);
        for seq in 1..=4 {
            result.record_read();
            result.record_failed(detail(seq, Some(7)));
        }

        assert_eq!(result.failed, 4);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures_dropped, 2);
        assert_eq!(result.error_codes.get(&7), Some(&4));
        assert!(result.is_fully_accounted());
    }

    #[test]
    fn test_per_data_source_breakdown() {
        let mut result = BulkLoadResult::new(Uuid::new_v4(), 10);
        result.record_read();
        result.record_loaded("CUSTOMERS");
        result.record_read();
        result.record_loaded("WATCHLIST");
        result.record_read();
        result.record_failed(detail(3, None));

        let customers = &result.by_data_source["CUSTOMERS"];
        assert_eq!(customers.loaded, 1);
        assert_eq!(customers.failed, 1);
        assert_eq!(result.by_data_source["WATCHLIST"].loaded, 1);
        assert!(result.error_codes.is_empty());
    }

    #[test]
    fn test_finish_sets_timestamps() {
        let mut result = BulkLoadResult::new(Uuid::new_v4(), 10);
        assert!(result.duration_ms().is_none());
        result.finish(BulkLoadStatus::Completed);
        assert_eq!(result.status, BulkLoadStatus::Completed);
        assert!(result.duration_ms().unwrap() >= 0);
    }
}
