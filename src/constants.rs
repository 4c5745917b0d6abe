//! # System Constants
//!
//! Core constants that define the operational boundaries of the gateway: the
//! names of every engine operation this layer knows about, the native error
//! codes it classifies, and the default tunables used when configuration is
//! silent.

/// Names of the engine operations routed through this layer
pub mod operations {
    // Record mutation
    pub const ADD_RECORD: &str = "add_record";
    pub const DELETE_RECORD: &str = "delete_record";
    pub const REEVALUATE_RECORD: &str = "reevaluate_record";
    pub const REEVALUATE_ENTITY: &str = "reevaluate_entity";

    // Lookup
    pub const GET_RECORD: &str = "get_record";
    pub const GET_ENTITY_BY_RECORD_ID: &str = "get_entity_by_record_id";
    pub const GET_ENTITY_BY_ENTITY_ID: &str = "get_entity_by_entity_id";
    pub const GET_VIRTUAL_ENTITY_BY_RECORD_ID: &str = "get_virtual_entity_by_record_id";

    // Search, path and network
    pub const SEARCH_BY_ATTRIBUTES: &str = "search_by_attributes";
    pub const FIND_PATH_BY_ENTITY_ID: &str = "find_path_by_entity_id";
    pub const FIND_PATH_BY_RECORD_ID: &str = "find_path_by_record_id";
    pub const FIND_NETWORK_BY_ENTITY_ID: &str = "find_network_by_entity_id";
    pub const FIND_NETWORK_BY_RECORD_ID: &str = "find_network_by_record_id";

    // Why / how
    pub const WHY_RECORDS: &str = "why_records";
    pub const WHY_ENTITIES: &str = "why_entities";
    pub const WHY_RECORD_IN_ENTITY: &str = "why_record_in_entity";
    pub const HOW_ENTITY_BY_ENTITY_ID: &str = "how_entity_by_entity_id";

    // Redo processing
    pub const PROCESS_REDO_RECORD: &str = "process_redo_record";
    pub const GET_REDO_RECORD: &str = "get_redo_record";
    pub const COUNT_REDO_RECORDS: &str = "count_redo_records";

    // Reporting and export primitives
    pub const GET_STATS: &str = "get_stats";
    pub const PRIME_ENGINE: &str = "prime_engine";
    pub const EXPORT_JSON_ENTITY_REPORT: &str = "export_json_entity_report";
    pub const EXPORT_CSV_ENTITY_REPORT: &str = "export_csv_entity_report";
    pub const FETCH_NEXT: &str = "fetch_next";
    pub const CLOSE_EXPORT: &str = "close_export";

    // Lifecycle, owned centrally by the engine context
    pub const INIT: &str = "init";
    pub const DESTROY: &str = "destroy";
    pub const REINIT: &str = "reinit";
    pub const GET_ACTIVE_CONFIG_ID: &str = "get_active_config_id";
}

/// Native error codes recognised by the error classifier.
///
/// Codes not listed here classify as fatal.
pub mod error_codes {
    /// Status returned by the engine for a successful call
    pub const STATUS_OK: i32 = 0;

    pub const DATABASE_CONNECTION_LOST: i64 = 1006;
    pub const DATABASE_CONNECTION_FAILURE: i64 = 1007;
    pub const STATEMENT_ON_INVALID_CONNECTION: i64 = 1008;

    pub const CONFIGURATION_NOT_CURRENT: i64 = 7221;
    pub const CONFIGURATION_MISMATCH: i64 = 7223;

    pub const UNKNOWN_RECORD: i64 = 33;
    pub const UNKNOWN_RESOLVED_ENTITY: i64 = 37;

    pub const INVALID_JSON: i64 = 2;
    pub const MISSING_REQUIRED_FIELD: i64 = 7;
    pub const UNKNOWN_DATA_SOURCE: i64 = 23;
    pub const INVALID_FLAGS: i64 = 87;

    pub const UNSUPPORTED_OPERATION: i64 = 48;
}

/// Default tunables used when configuration does not say otherwise
pub mod defaults {
    pub const ENGINE_CONCURRENCY: usize = 8;
    pub const BULK_CONCURRENCY: usize = 16;
    pub const RECONCILE_PERIOD_SECONDS: u64 = 300;
    pub const MAX_CONSECUTIVE_RECONCILE_FAILURES: u32 = 5;
    pub const STALENESS_CHECK_CACHE_WINDOW_MS: u64 = 10_000;
    pub const BULK_MAX_FAILURES: i64 = -1;
    pub const BULK_PROGRESS_INTERVAL_MS: u64 = 3_000;
    pub const BULK_FAILURE_LEDGER_SIZE: usize = 50;
    pub const DISPATCH_RESULT_TIMEOUT_MS: u64 = 120_000;
}

/// Required record attributes for bulk ingestion
pub mod record_fields {
    pub const DATA_SOURCE: &str = "DATA_SOURCE";
    pub const RECORD_ID: &str = "RECORD_ID";
}
