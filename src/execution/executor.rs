//! # Bounded Engine Executor
//!
//! Fixed set of dedicated OS threads ("slots"), each owning exactly one
//! engine handle for its whole life. Async callers hand a closure to
//! [`BoundedEngineExecutor::execute_in_thread`] and await its result, so at
//! most `concurrency` native calls run at once and further callers queue.
//!
//! A task that panics is reported to its caller as
//! [`GatewayError::TaskPanicked`]; the slot survives and keeps its handle.

use async_trait::async_trait;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ConfigurationError;
use crate::engine::{Engine, EngineFactory, NativeOutcome};
use crate::error::{GatewayError, Result};
use crate::registry::OperationDescriptor;
use crate::resilience::{CallRoute, EngineInvoker};

type Job = Box<dyn FnOnce(usize, &mut dyn Engine) + Send + 'static>;

/// Point-in-time executor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub slots: usize,
    /// Jobs submitted but not yet finished, queued ones included
    pub in_flight: u64,
    pub completed: u64,
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct ExecutorCounters {
    in_flight: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// N slots, one engine handle each
pub struct BoundedEngineExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    slots: Mutex<Vec<JoinHandle<()>>>,
    slot_count: usize,
    counters: Arc<ExecutorCounters>,
}

impl std::fmt::Debug for BoundedEngineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedEngineExecutor")
            .field("stats", &self.stats())
            .finish()
    }
}

impl BoundedEngineExecutor {
    /// Create `concurrency` slots, each with its own handle from `factory`
    pub fn start(factory: &dyn EngineFactory, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.concurrency",
                "0",
                "must be at least 1",
            )
            .into());
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let mut slots = Vec::with_capacity(concurrency);

        for slot in 0..concurrency {
            let mut engine = factory.create(slot)?;
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("engine-slot-{slot}"))
                .spawn(move || {
                    debug!(slot = slot, "Engine slot started");
                    while let Ok(job) = receiver.recv() {
                        job(slot, engine.as_mut());
                    }
                    debug!(slot = slot, "Engine slot stopped");
                })
                .map_err(|e| {
                    GatewayError::Lifecycle(format!("failed to spawn engine slot {slot}: {e}"))
                })?;
            slots.push(handle);
        }

        info!(slots = concurrency, "🚀 EXECUTOR: Bounded engine executor started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            slots: Mutex::new(slots),
            slot_count: concurrency,
            counters: Arc::new(ExecutorCounters::default()),
        })
    }

    /// Run `task` on a slot with exclusive access to that slot's engine handle
    pub async fn execute_in_thread<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Engine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.submit(task, move |result| {
            let _ = result_tx.send(result);
        })?;

        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ExecutorClosed),
        }
    }

    /// Blocking variant of [`execute_in_thread`](Self::execute_in_thread) for synchronous callers
    pub fn execute_blocking<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Engine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        self.submit(task, move |result| {
            let _ = result_tx.send(result);
        })?;

        result_rx
            .recv()
            .unwrap_or(Err(GatewayError::ExecutorClosed))
    }

    fn submit<T, F, R>(&self, task: F, reply: R) -> Result<()>
    where
        F: FnOnce(&mut dyn Engine) -> T + Send + 'static,
        T: Send + 'static,
        R: FnOnce(Result<T>) + Send + 'static,
    {
        let counters = Arc::clone(&self.counters);
        let job: Job = Box::new(move |slot, engine| {
            let result = match std::panic::catch_unwind(AssertUnwindSafe(|| task(engine))) {
                Ok(value) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    Ok(value)
                }
                Err(panic) => {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    let message = panic_message(panic.as_ref());
                    error!(slot = slot, panic_msg = %message, "❌ EXECUTOR: Engine task panicked");
                    Err(GatewayError::TaskPanicked {
                        worker: slot,
                        message,
                    })
                }
            };
            counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            reply(result);
        });

        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(GatewayError::ExecutorClosed);
        };

        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        if sender.send(job).is_err() {
            self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            return Err(GatewayError::ExecutorClosed);
        }
        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.slot_count
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            slots: self.slot_count,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let queued jobs finish and join every slot.
    ///
    /// Blocks the calling thread until all slots have exited.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let slots: Vec<_> = self.slots.lock().drain(..).collect();
        for (slot, handle) in slots.into_iter().enumerate() {
            if handle.join().is_err() {
                warn!(slot = slot, "Engine slot thread exited abnormally");
            }
        }
        info!("🛑 EXECUTOR: Bounded engine executor shut down");
    }
}

impl Drop for BoundedEngineExecutor {
    fn drop(&mut self) {
        // Slots exit on their own once the channel closes
        self.sender.lock().take();
    }
}

#[async_trait]
impl EngineInvoker for BoundedEngineExecutor {
    async fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        args: Arc<Vec<Value>>,
        _route: &CallRoute,
    ) -> Result<NativeOutcome> {
        let operation = descriptor.name.clone();
        self.execute_in_thread(move |engine| NativeOutcome::capture(engine, &operation, &args))
            .await
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{EngineScript, ScriptedEngineFactory, ScriptedResponse};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn executor(concurrency: usize) -> (BoundedEngineExecutor, Arc<EngineScript>) {
        let script = Arc::new(EngineScript::new());
        let factory = ScriptedEngineFactory::new(Arc::clone(&script));
        (
            BoundedEngineExecutor::start(&factory, concurrency).unwrap(),
            script,
        )
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let factory = ScriptedEngineFactory::new(Arc::new(EngineScript::new()));
        assert!(matches!(
            BoundedEngineExecutor::start(&factory, 0),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_slot_serializes_callers() {
        let (executor, _script) = executor(1);
        let executor = Arc::new(executor);
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let executor = Arc::clone(&executor);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            handles.push(tokio::spawn(async move {
                executor
                    .execute_in_thread(move |_engine| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().completed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_native_calls_bounded_by_slot_count() {
        let (executor, script) = executor(3);
        script.set_responder(|_operation, _args| {
            Some(ScriptedResponse::success("{}").with_delay(Duration::from_millis(40)))
        });
        let executor = Arc::new(executor);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let executor = Arc::clone(&executor);
            handles.push(tokio::spawn(async move {
                executor
                    .execute_in_thread(|engine| NativeOutcome::capture(engine, "get_stats", &[]))
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_success());
        }
        assert_eq!(script.invocations("get_stats"), 10);
        assert_eq!(script.max_concurrent(), 3);
        assert_eq!(executor.stats().completed, 10);
    }

    #[tokio::test]
    async fn test_task_runs_against_slot_engine() {
        let (executor, script) = executor(2);
        script.push("get_stats", ScriptedResponse::success(r#"{"workload":{}}"#));

        let outcome = executor
            .execute_in_thread(|engine| NativeOutcome::capture(engine, "get_stats", &[]))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.payload, r#"{"workload":{}}"#);
        assert_eq!(script.invocations("get_stats"), 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_slot_survives() {
        let (executor, _script) = executor(1);

        let err = executor
            .execute_in_thread(|_engine| -> u32 { panic!("engine exploded") })
            .await
            .unwrap_err();
        match err {
            GatewayError::TaskPanicked { worker, message } => {
                assert_eq!(worker, 0);
                assert!(message.contains("engine exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let value = executor.execute_in_thread(|_engine| 42).await.unwrap();
        assert_eq!(value, 42);

        let stats = executor.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let (executor, _script) = executor(2);
        executor.shutdown();

        assert!(matches!(
            executor.execute_in_thread(|_engine| ()).await,
            Err(GatewayError::ExecutorClosed)
        ));
        assert!(matches!(
            executor.execute_blocking(|_engine| ()),
            Err(GatewayError::ExecutorClosed)
        ));
    }

    #[test]
    fn test_execute_blocking() {
        let (executor, _script) = executor(1);
        assert_eq!(executor.execute_blocking(|_engine| "done").unwrap(), "done");
    }
}
