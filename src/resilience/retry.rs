//! # Retrying Call Wrapper
//!
//! Single entry point for engine operations. Policy comes from the
//! [`OperationClassifier`]; execution goes through an [`EngineInvoker`]
//! (the bounded executor or the priority dispatch queue).
//!
//! A retryable operation is invoked at most twice. The second attempt only
//! happens when the first failure was reconnect-class (after a forced
//! staleness check, whatever its outcome) or when an unforced staleness check
//! actually refreshed the engine configuration.
//!
//! Retrying a mutation is not idempotent: if the first attempt was applied
//! before the failure was reported, the retry may apply it again.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::error_classifier::{classify_native_code, ErrorClass};
use super::staleness::{RefreshOutcome, StalenessCheck};
use crate::engine::NativeOutcome;
use crate::error::{GatewayError, Result};
use crate::execution::PriorityTier;
use crate::logging::{log_engine_operation, log_error, log_refresh_event};
use crate::registry::{Availability, OperationClassifier, OperationDescriptor, OperationPolicy};

/// Routing hints for invokers that support them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallRoute {
    pub tier: PriorityTier,
    /// Dispatch worker that must execute the call
    pub affinity: Option<usize>,
}

impl CallRoute {
    pub fn with_tier(tier: PriorityTier) -> Self {
        Self {
            tier,
            affinity: None,
        }
    }

    pub fn pinned(tier: PriorityTier, worker_id: usize) -> Self {
        Self {
            tier,
            affinity: Some(worker_id),
        }
    }
}

/// Something that performs one native invocation on an owned engine handle
#[async_trait]
pub trait EngineInvoker: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        args: Arc<Vec<Value>>,
        route: &CallRoute,
    ) -> Result<NativeOutcome>;
}

/// Final result of a call that was not turned into an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    pub operation: String,
    pub status: i32,
    pub error_code: i64,
    pub error_message: String,
    pub payload: String,
    pub attempts: u8,
}

impl CallOutcome {
    fn from_native(operation: &str, native: NativeOutcome, attempts: u8) -> Self {
        Self {
            operation: operation.to_string(),
            status: native.status,
            error_code: native.error_code,
            error_message: native.error_message,
            payload: native.payload,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == crate::constants::error_codes::STATUS_OK
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub calls: u64,
    pub retries: u64,
    pub recovered: u64,
    pub exhausted: u64,
    pub refused: u64,
}

#[derive(Debug, Default)]
struct RetryCounters {
    calls: AtomicU64,
    retries: AtomicU64,
    recovered: AtomicU64,
    exhausted: AtomicU64,
    refused: AtomicU64,
}

/// Classifies, executes and, where allowed, refreshes and retries engine calls
pub struct RetryingCaller {
    classifier: Arc<OperationClassifier>,
    invoker: Arc<dyn EngineInvoker>,
    monitor: Arc<dyn StalenessCheck>,
    counters: RetryCounters,
}

impl std::fmt::Debug for RetryingCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingCaller")
            .field("stats", &self.stats())
            .finish()
    }
}

impl RetryingCaller {
    pub fn new(
        classifier: Arc<OperationClassifier>,
        invoker: Arc<dyn EngineInvoker>,
        monitor: Arc<dyn StalenessCheck>,
    ) -> Self {
        Self {
            classifier,
            invoker,
            monitor,
            counters: RetryCounters::default(),
        }
    }

    pub fn classifier(&self) -> &Arc<OperationClassifier> {
        &self.classifier
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            recovered: self.counters.recovered.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            refused: self.counters.refused.load(Ordering::Relaxed),
        }
    }

    /// Call `operation` with default routing
    pub async fn call(&self, operation: &str, args: Vec<Value>) -> Result<CallOutcome> {
        self.call_with(operation, args, CallRoute::default()).await
    }

    /// Call `operation` with explicit routing hints
    pub async fn call_with(
        &self,
        operation: &str,
        args: Vec<Value>,
        route: CallRoute,
    ) -> Result<CallOutcome> {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let descriptor = self.classifier.classify(operation);

        if descriptor.policy == OperationPolicy::Unsupported {
            self.counters.refused.fetch_add(1, Ordering::Relaxed);
            let reason = match descriptor.availability {
                Availability::Available => "operation is not routed by this gateway",
                Availability::MissingFromEngine => "operation is not exposed by the linked engine",
                Availability::Unrecognized => "operation is not yet classified",
            };
            debug!(operation = %operation, reason = reason, "Refusing unsupported operation");
            return Err(GatewayError::unsupported(operation, reason));
        }

        descriptor.validate_args(&args)?;
        let args = Arc::new(args);

        match descriptor.policy {
            OperationPolicy::Direct => {
                let native = self.attempt(&descriptor, &args, &route, 1).await?;
                Ok(CallOutcome::from_native(operation, native, 1))
            }
            _ => self.call_retryable(&descriptor, args, route).await,
        }
    }

    async fn attempt(
        &self,
        descriptor: &OperationDescriptor,
        args: &Arc<Vec<Value>>,
        route: &CallRoute,
        attempt: u8,
    ) -> Result<NativeOutcome> {
        let started = Instant::now();
        let native = self
            .invoker
            .invoke(descriptor, Arc::clone(args), route)
            .await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if native.is_success() {
            debug!(
                operation = %descriptor.name,
                attempt = attempt,
                duration_ms = duration_ms,
                "Engine call succeeded"
            );
        } else {
            log_engine_operation(
                &descriptor.name,
                attempt,
                "failed",
                Some(native.error_code),
                Some(duration_ms),
            );
        }
        Ok(native)
    }

    async fn call_retryable(
        &self,
        descriptor: &OperationDescriptor,
        args: Arc<Vec<Value>>,
        route: CallRoute,
    ) -> Result<CallOutcome> {
        let operation = descriptor.name.as_str();

        let first = self.attempt(descriptor, &args, &route, 1).await?;
        if first.is_success() {
            return Ok(CallOutcome::from_native(operation, first, 1));
        }

        let first_class = classify_native_code(first.error_code);
        let retry = match first_class {
            ErrorClass::ReconnectRequired => {
                let refresh = self.monitor.ensure_current(true).await;
                log_refresh_event(
                    "reconnect_retry",
                    true,
                    &format!("{refresh:?}"),
                    Some(operation),
                );
                true
            }
            _ => {
                let refresh = self.monitor.ensure_current(false).await;
                if refresh != RefreshOutcome::Unchanged {
                    log_refresh_event(
                        "failure_retry",
                        false,
                        &format!("{refresh:?}"),
                        Some(operation),
                    );
                }
                refresh == RefreshOutcome::Refreshed
            }
        };

        if !retry {
            return Err(engine_error(first_class, operation, &first));
        }

        self.counters.retries.fetch_add(1, Ordering::Relaxed);
        info!(
            operation = %operation,
            error_code = first.error_code,
            error_class = %first_class,
            "🔁 RETRY: Retrying engine call once"
        );

        let second = match self.attempt(descriptor, &args, &route, 2).await {
            Ok(native) => native,
            Err(e) => {
                // The retry never produced a native status; still report both attempts
                self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                log_first_failure(operation, &first);
                error!(
                    operation = %operation,
                    attempt = 2,
                    error = %e,
                    "❌ RETRY: Retry could not be executed"
                );
                log_error(
                    "retry",
                    operation,
                    &e.to_string(),
                    Some(&format!("first attempt: {}", first.native_error())),
                );
                return Err(e);
            }
        };
        if second.is_success() {
            self.counters.recovered.fetch_add(1, Ordering::Relaxed);
            info!(operation = %operation, "✅ RETRY: Engine call recovered on retry");
            return Ok(CallOutcome::from_native(operation, second, 2));
        }

        self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
        let second_class = classify_native_code(second.error_code);
        log_first_failure(operation, &first);
        error!(
            operation = %operation,
            attempt = 2,
            error_code = second.error_code,
            error_message = %second.error_message,
            "❌ RETRY: Retry failed"
        );
        log_error(
            "retry",
            operation,
            &second.native_error().to_string(),
            Some(&format!("first attempt: {}", first.native_error())),
        );

        Err(engine_error(second_class, operation, &second))
    }
}

fn log_first_failure(operation: &str, first: &NativeOutcome) {
    warn!(
        operation = %operation,
        attempt = 1,
        error_code = first.error_code,
        error_message = %first.error_message,
        "First attempt failed"
    );
}

fn engine_error(class: ErrorClass, operation: &str, native: &NativeOutcome) -> GatewayError {
    GatewayError::Engine {
        class,
        operation: operation.to_string(),
        code: native.error_code,
        message: native.error_message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::error_codes::{
        DATABASE_CONNECTION_LOST, STATEMENT_ON_INVALID_CONNECTION, UNKNOWN_RECORD,
    };
    use crate::constants::operations as ops;
    use crate::test_helpers::{EngineScript, ScriptedResponse};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Invoker that runs calls inline against a scripted engine
    struct InlineInvoker {
        engine: Mutex<Box<dyn crate::engine::Engine>>,
    }

    #[async_trait]
    impl EngineInvoker for InlineInvoker {
        async fn invoke(
            &self,
            descriptor: &OperationDescriptor,
            args: Arc<Vec<Value>>,
            _route: &CallRoute,
        ) -> Result<NativeOutcome> {
            let mut engine = self.engine.lock();
            Ok(NativeOutcome::capture(
                engine.as_mut(),
                &descriptor.name,
                &args,
            ))
        }
    }

    /// Monitor stub recording each check
    struct RecordingMonitor {
        outcome: RefreshOutcome,
        checks: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl StalenessCheck for RecordingMonitor {
        async fn ensure_current(&self, force_check: bool) -> RefreshOutcome {
            self.checks.lock().push(force_check);
            self.outcome
        }
    }

    fn caller_with(
        script: &Arc<EngineScript>,
        outcome: RefreshOutcome,
    ) -> (RetryingCaller, Arc<RecordingMonitor>) {
        let classifier =
            Arc::new(OperationClassifier::build(&OperationClassifier::expected_surface()).unwrap());
        let invoker = Arc::new(InlineInvoker {
            engine: Mutex::new(Box::new(script.engine())),
        });
        let monitor = Arc::new(RecordingMonitor {
            outcome,
            checks: Mutex::new(Vec::new()),
        });
        (
            RetryingCaller::new(classifier, invoker, monitor.clone()),
            monitor,
        )
    }

    fn get_record_args() -> Vec<Value> {
        vec![json!("TEST"), json!("1001"), json!(0)]
    }

    #[tokio::test]
    async fn test_success_is_single_invocation() {
        let script = Arc::new(EngineScript::new());
        script.push(ops::GET_RECORD, ScriptedResponse::success(r#"{"RECORD_ID":"1001"}"#));
        let (caller, monitor) = caller_with(&script, RefreshOutcome::Unchanged);

        let outcome = caller.call(ops::GET_RECORD, get_record_args()).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.payload, r#"{"RECORD_ID":"1001"}"#);
        assert_eq!(script.invocations(ops::GET_RECORD), 1);
        assert!(monitor.checks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_failure_forces_check_and_retries() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(DATABASE_CONNECTION_LOST, "connection lost"),
        );
        script.push(ops::GET_RECORD, ScriptedResponse::success("{}"));
        let (caller, monitor) = caller_with(&script, RefreshOutcome::Unchanged);

        let outcome = caller.call(ops::GET_RECORD, get_record_args()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(*monitor.checks.lock(), vec![true]);
        assert_eq!(caller.stats().recovered, 1);
    }

    #[tokio::test]
    async fn test_reconnect_retry_happens_even_when_refresh_fails() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(STATEMENT_ON_INVALID_CONNECTION, "invalid connection"),
        );
        script.push(ops::GET_RECORD, ScriptedResponse::success("{}"));
        let (caller, _monitor) = caller_with(&script, RefreshOutcome::Failed);

        assert!(caller.call(ops::GET_RECORD, get_record_args()).await.is_ok());
        assert_eq!(script.invocations(ops::GET_RECORD), 2);
    }

    #[tokio::test]
    async fn test_non_reconnect_failure_with_current_config_is_not_retried() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(UNKNOWN_RECORD, "Unknown record"),
        );
        let (caller, monitor) = caller_with(&script, RefreshOutcome::Unchanged);

        let err = caller
            .call(ops::GET_RECORD, get_record_args())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(script.invocations(ops::GET_RECORD), 1);
        assert_eq!(*monitor.checks.lock(), vec![false]);
    }

    #[tokio::test]
    async fn test_non_reconnect_failure_retried_after_refresh() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(UNKNOWN_RECORD, "Unknown record"),
        );
        script.push(ops::GET_RECORD, ScriptedResponse::success("{}"));
        let (caller, _monitor) = caller_with(&script, RefreshOutcome::Refreshed);

        let outcome = caller.call(ops::GET_RECORD, get_record_args()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_second_failure_surfaces_second_error() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(DATABASE_CONNECTION_LOST, "connection lost"),
        );
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(UNKNOWN_RECORD, "Unknown record"),
        );
        script.push(ops::GET_RECORD, ScriptedResponse::success("{}"));
        let (caller, _monitor) = caller_with(&script, RefreshOutcome::Refreshed);

        let err = caller
            .call(ops::GET_RECORD, get_record_args())
            .await
            .unwrap_err();
        match err {
            GatewayError::Engine { class, code, .. } => {
                assert_eq!(class, ErrorClass::NotFound);
                assert_eq!(code, UNKNOWN_RECORD);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(script.invocations(ops::GET_RECORD), 2);
        assert_eq!(caller.stats().exhausted, 1);
    }

    /// Runs the first call inline, then behaves like a closed executor
    struct ClosingInvoker {
        inner: InlineInvoker,
        calls: AtomicU64,
    }

    #[async_trait]
    impl EngineInvoker for ClosingInvoker {
        async fn invoke(
            &self,
            descriptor: &OperationDescriptor,
            args: Arc<Vec<Value>>,
            route: &CallRoute,
        ) -> Result<NativeOutcome> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.invoke(descriptor, args, route).await
            } else {
                Err(GatewayError::ExecutorClosed)
            }
        }
    }

    #[tokio::test]
    async fn test_retry_that_cannot_execute_is_counted_as_exhausted() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::GET_RECORD,
            ScriptedResponse::failure(DATABASE_CONNECTION_LOST, "connection lost"),
        );
        let classifier =
            Arc::new(OperationClassifier::build(&OperationClassifier::expected_surface()).unwrap());
        let invoker = Arc::new(ClosingInvoker {
            inner: InlineInvoker {
                engine: Mutex::new(Box::new(script.engine())),
            },
            calls: AtomicU64::new(0),
        });
        let monitor = Arc::new(RecordingMonitor {
            outcome: RefreshOutcome::Unchanged,
            checks: Mutex::new(Vec::new()),
        });
        let caller = RetryingCaller::new(classifier, invoker.clone(), monitor.clone());

        let err = caller
            .call(ops::GET_RECORD, get_record_args())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ExecutorClosed));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*monitor.checks.lock(), vec![true]);
        assert_eq!(caller.stats().retries, 1);
        assert_eq!(caller.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn test_direct_operation_returns_native_status() {
        let script = Arc::new(EngineScript::new());
        script.push(
            ops::EXPORT_JSON_ENTITY_REPORT,
            ScriptedResponse::failure(DATABASE_CONNECTION_LOST, "connection lost"),
        );
        let (caller, monitor) = caller_with(&script, RefreshOutcome::Refreshed);

        let outcome = caller
            .call(ops::EXPORT_JSON_ENTITY_REPORT, vec![json!(0)])
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_code, DATABASE_CONNECTION_LOST);
        assert_eq!(script.invocations(ops::EXPORT_JSON_ENTITY_REPORT), 1);
        assert!(monitor.checks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_operation_never_reaches_engine() {
        let script = Arc::new(EngineScript::new());
        let (caller, _monitor) = caller_with(&script, RefreshOutcome::Unchanged);

        let err = caller.call(ops::DESTROY, vec![]).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
        assert_eq!(script.invocations(ops::DESTROY), 0);

        let err = caller.call("find_interesting_entities", vec![]).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
        assert_eq!(caller.stats().refused, 2);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_engine() {
        let script = Arc::new(EngineScript::new());
        let (caller, _monitor) = caller_with(&script, RefreshOutcome::Unchanged);

        let err = caller
            .call(ops::GET_RECORD, vec![json!("TEST")])
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(script.invocations(ops::GET_RECORD), 0);
    }
}
