//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging concurrent engine access, refreshes and bulk loads.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        if let Err(e) = fs::create_dir_all(&log_dir) {
            // Console-only logging is still useful
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_filter(build_filter(&log_level)))
                .try_init();
            tracing::warn!(error = %e, "Unable to create log directory, logging to console only");
            return;
        }

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(build_filter(&log_level)),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level)),
            );

        // A host process may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // Keep the non-blocking writer alive for the life of the process
        std::mem::forget(guard);
    });
}

/// `RUST_LOG` wins over the environment default
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("GATEWAY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for one native engine invocation
pub fn log_engine_operation(
    operation: &str,
    attempt: u8,
    status: &str,
    error_code: Option<i64>,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        attempt = attempt,
        status = %status,
        error_code = error_code,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "⚙️ ENGINE_OPERATION"
    );
}

/// Log structured data for a configuration refresh check
pub fn log_refresh_event(trigger: &str, force_check: bool, outcome: &str, details: Option<&str>) {
    tracing::info!(
        trigger = %trigger,
        force_check = force_check,
        outcome = %outcome,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔄 REFRESH_EVENT"
    );
}

/// Log structured data for bulk load progress
pub fn log_bulk_progress(
    job_id: &str,
    records_read: u64,
    loaded: u64,
    failed: u64,
    incomplete: u64,
    status: &str,
) {
    tracing::info!(
        job_id = %job_id,
        records_read = records_read,
        loaded = loaded,
        failed = failed,
        incomplete = incomplete,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 BULK_PROGRESS"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("GATEWAY_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("GATEWAY_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_helpers_do_not_require_subscriber() {
        log_engine_operation("add_record", 1, "success", None, Some(3));
        log_refresh_event("retry", true, "refreshed", None);
        log_bulk_progress("job", 10, 8, 1, 1, "running");
        log_error("retry", "add_record", "boom", Some("second attempt"));
    }
}
