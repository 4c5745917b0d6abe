//! # Dispatch Workers
//!
//! Dedicated worker threads draining the [`DispatchQueue`]. Each worker has a
//! fixed id used for affinity, a set of engine capabilities it serves and its
//! own engine handle.
//!
//! ```text
//! submit → [DispatchQueue] → worker.take() → engine.invoke() → [ResponseRegistry] → PendingResult
//! ```
//!
//! Worker phases: `WaitingForWork → Dequeuing → Executing → Publishing`, back
//! to `WaitingForWork`, and `Stopped` once the worker has taken the shutdown
//! sentinel.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::executor::panic_message;
use super::priority_queue::{DispatchQueue, PriorityTier, QueueEntry, WorkItem};
use crate::config::{ConfigurationError, WorkerProfile};
use crate::engine::{Engine, EngineCapability, EngineFactory, NativeOutcome};
use crate::error::{GatewayError, Result};
use crate::registry::OperationDescriptor;
use crate::resilience::{CallRoute, EngineInvoker};

/// Where a dispatch worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    WaitingForWork = 0,
    Dequeuing = 1,
    Executing = 2,
    Publishing = 3,
    Stopped = 4,
}

impl From<u8> for WorkerPhase {
    fn from(value: u8) -> Self {
        match value {
            0 => WorkerPhase::WaitingForWork,
            1 => WorkerPhase::Dequeuing,
            2 => WorkerPhase::Executing,
            3 => WorkerPhase::Publishing,
            _ => WorkerPhase::Stopped,
        }
    }
}

/// Live counters for one worker
#[derive(Debug)]
pub struct WorkerStatus {
    worker_id: usize,
    phase: AtomicU8,
    processed: AtomicU64,
    sentinels_observed: AtomicU64,
}

impl WorkerStatus {
    pub(crate) fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            phase: AtomicU8::new(WorkerPhase::WaitingForWork as u8),
            processed: AtomicU64::new(0),
            sentinels_observed: AtomicU64::new(0),
        }
    }

    pub(crate) fn enter(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            worker_id: self.worker_id,
            phase: WorkerPhase::from(self.phase.load(Ordering::Acquire)),
            processed: self.processed.load(Ordering::Acquire),
            sentinels_observed: self.sentinels_observed.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub worker_id: usize,
    pub phase: WorkerPhase,
    pub processed: u64,
    pub sentinels_observed: u64,
}

/// Result of one dispatched work item
#[derive(Debug, Clone)]
pub struct WorkResult {
    pub correlation_id: Uuid,
    pub worker_id: usize,
    /// Native outcome, or the panic message if the invocation panicked
    pub outcome: std::result::Result<NativeOutcome, String>,
    pub queued: Duration,
    pub execution: Duration,
}

/// Correlation id → waiting submitter
#[derive(Debug, Default)]
pub struct ResponseRegistry {
    waiting: DashMap<Uuid, oneshot::Sender<WorkResult>>,
}

impl ResponseRegistry {
    fn register(&self, correlation_id: Uuid) -> oneshot::Receiver<WorkResult> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(correlation_id, tx);
        rx
    }

    fn cancel(&self, correlation_id: &Uuid) {
        self.waiting.remove(correlation_id);
    }

    fn publish(&self, result: WorkResult) {
        match self.waiting.remove(&result.correlation_id) {
            Some((_, sender)) => {
                if sender.send(result).is_err() {
                    debug!("Submitter stopped waiting before the result was published");
                }
            }
            None => warn!(
                correlation_id = %result.correlation_id,
                "No submitter registered for work result"
            ),
        }
    }

    pub fn pending(&self) -> usize {
        self.waiting.len()
    }
}

/// Submitter side of a dispatched work item
#[derive(Debug)]
pub struct PendingResult {
    correlation_id: Uuid,
    receiver: oneshot::Receiver<WorkResult>,
    queue: Arc<DispatchQueue>,
    registry: Arc<ResponseRegistry>,
}

impl PendingResult {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub async fn wait(self) -> Result<WorkResult> {
        self.receiver.await.map_err(|_| GatewayError::QueueShutdown)
    }

    /// Wait up to `timeout` for the item to be taken by a worker.
    ///
    /// When the timeout elapses while the item is still queued it is withdrawn
    /// and never executes. An item a worker has already taken is always
    /// waited for, so a `Timeout` error means the engine was not called.
    pub async fn wait_timeout(mut self, timeout: Duration) -> Result<WorkResult> {
        if let Ok(received) = tokio::time::timeout(timeout, &mut self.receiver).await {
            return received.map_err(|_| GatewayError::QueueShutdown);
        }

        let correlation_id = self.correlation_id;
        if self.queue.withdraw(correlation_id) {
            self.registry.cancel(&correlation_id);
            warn!(
                correlation_id = %correlation_id,
                timeout_ms = timeout.as_millis() as u64,
                "⏱️ DISPATCH: Work item withdrawn after waiting too long in the queue"
            );
            return Err(GatewayError::Timeout {
                operation: format!("dispatch result {correlation_id}"),
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        debug!(
            correlation_id = %correlation_id,
            "Result timeout elapsed during execution, waiting for completion"
        );
        self.receiver.await.map_err(|_| GatewayError::QueueShutdown)
    }
}

/// Priority queue plus the worker threads that drain it
pub struct PriorityDispatchQueue {
    queue: Arc<DispatchQueue>,
    registry: Arc<ResponseRegistry>,
    profiles: Vec<WorkerProfile>,
    statuses: Vec<Arc<WorkerStatus>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    result_timeout: Duration,
}

impl std::fmt::Debug for PriorityDispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityDispatchQueue")
            .field("profiles", &self.profiles)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl PriorityDispatchQueue {
    /// Start one worker thread per profile, each with its own engine handle
    pub fn start(
        factory: &dyn EngineFactory,
        profiles: &[WorkerProfile],
        result_timeout: Duration,
    ) -> Result<Self> {
        if profiles.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "dispatch.workers",
                "[]",
                "at least one worker is required",
            )
            .into());
        }

        let queue = Arc::new(DispatchQueue::new());
        let registry = Arc::new(ResponseRegistry::default());
        let mut statuses = Vec::with_capacity(profiles.len());
        let mut workers = Vec::with_capacity(profiles.len());

        for (slot, profile) in profiles.iter().enumerate() {
            let engine = match factory.create(slot) {
                Ok(engine) => engine,
                Err(e) => {
                    queue.begin_shutdown();
                    return Err(e);
                }
            };
            let status = Arc::new(WorkerStatus::new(profile.worker_id));
            let worker = DispatchWorker {
                profile: profile.clone(),
                engine,
                queue: Arc::clone(&queue),
                registry: Arc::clone(&registry),
                status: Arc::clone(&status),
            };

            let spawned = std::thread::Builder::new()
                .name(format!("dispatch-worker-{}", profile.worker_id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    queue.begin_shutdown();
                    return Err(GatewayError::Lifecycle(format!(
                        "failed to spawn dispatch worker {}: {e}",
                        profile.worker_id
                    )));
                }
            }
            statuses.push(status);
        }

        info!(
            workers = profiles.len(),
            "🚀 DISPATCH: Priority dispatch queue started"
        );

        Ok(Self {
            queue,
            registry,
            profiles: profiles.to_vec(),
            statuses,
            workers: Mutex::new(workers),
            result_timeout,
        })
    }

    /// Enqueue an operation and return a handle to its eventual result
    pub fn submit(
        &self,
        operation: &str,
        capability: EngineCapability,
        args: Arc<Vec<Value>>,
        route: CallRoute,
    ) -> Result<PendingResult> {
        self.check_serviceable(operation, capability, route.affinity)?;

        let mut item = WorkItem::new(operation, route.tier, capability, args);
        if let Some(worker_id) = route.affinity {
            item = item.with_affinity(worker_id);
        }
        let correlation_id = item.id;

        let receiver = self.registry.register(correlation_id);
        if let Err(e) = self.queue.enqueue(item) {
            self.registry.cancel(&correlation_id);
            return Err(e);
        }

        debug!(
            correlation_id = %correlation_id,
            operation = %operation,
            tier = ?route.tier,
            "Work item enqueued"
        );

        Ok(PendingResult {
            correlation_id,
            receiver,
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.registry),
        })
    }

    fn check_serviceable(
        &self,
        operation: &str,
        capability: EngineCapability,
        affinity: Option<usize>,
    ) -> Result<()> {
        let serviceable = match affinity {
            Some(worker_id) => self
                .profiles
                .iter()
                .any(|p| p.worker_id == worker_id && p.serves(capability)),
            None => self.profiles.iter().any(|p| p.serves(capability)),
        };

        if serviceable {
            return Ok(());
        }

        let reason = match affinity {
            Some(worker_id) => format!(
                "worker {worker_id} does not exist or does not serve the {} capability",
                capability.name()
            ),
            None => format!("no worker serves the {} capability", capability.name()),
        };
        Err(GatewayError::NoEligibleWorker {
            operation: operation.to_string(),
            reason,
        })
    }

    pub fn queue_depth(&self) -> Vec<(PriorityTier, usize)> {
        self.queue.depth_by_tier()
    }

    pub fn worker_statuses(&self) -> Vec<WorkerSnapshot> {
        self.statuses.iter().map(|s| s.snapshot()).collect()
    }

    /// Stop accepting work; workers exit once everything queued is done
    pub fn shutdown(&self) {
        if self.queue.begin_shutdown() {
            info!(
                pending = self.registry.pending(),
                "🛑 DISPATCH: Shutdown sentinel enqueued"
            );
        }
    }

    /// [`shutdown`](Self::shutdown), then block until every worker has exited
    pub fn shutdown_and_join(&self) {
        self.shutdown();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("Dispatch worker thread exited abnormally");
            }
        }
        info!("🛑 DISPATCH: All dispatch workers stopped");
    }
}

impl Drop for PriorityDispatchQueue {
    fn drop(&mut self) {
        self.queue.begin_shutdown();
    }
}

#[async_trait]
impl EngineInvoker for PriorityDispatchQueue {
    async fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        args: Arc<Vec<Value>>,
        route: &CallRoute,
    ) -> Result<NativeOutcome> {
        let pending = self.submit(&descriptor.name, descriptor.capability, args, *route)?;
        let result = pending.wait_timeout(self.result_timeout).await?;
        result.outcome.map_err(|message| GatewayError::TaskPanicked {
            worker: result.worker_id,
            message,
        })
    }
}

struct DispatchWorker {
    profile: WorkerProfile,
    engine: Box<dyn Engine>,
    queue: Arc<DispatchQueue>,
    registry: Arc<ResponseRegistry>,
    status: Arc<WorkerStatus>,
}

impl DispatchWorker {
    fn run(mut self) {
        let worker_id = self.profile.worker_id;
        debug!(worker_id = worker_id, "Dispatch worker started");

        loop {
            match self.queue.take(&self.profile, &self.status) {
                QueueEntry::Sentinel => {
                    self.status.sentinels_observed.fetch_add(1, Ordering::AcqRel);
                    self.queue.requeue_sentinel();
                    self.status.enter(WorkerPhase::Stopped);
                    info!(worker_id = worker_id, "Dispatch worker observed shutdown sentinel");
                    break;
                }
                QueueEntry::Work(item) => self.process(item),
            }
        }
    }

    fn process(&mut self, item: WorkItem) {
        let worker_id = self.profile.worker_id;
        let queued = item.created_at.elapsed();

        self.status.enter(WorkerPhase::Executing);
        let started = Instant::now();
        let engine = self.engine.as_mut();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            NativeOutcome::capture(engine, &item.operation, &item.args)
        }))
        .map_err(|panic| {
            let message = panic_message(panic.as_ref());
            error!(
                worker_id = worker_id,
                operation = %item.operation,
                panic_msg = %message,
                "❌ DISPATCH: Engine invocation panicked"
            );
            message
        });
        let execution = started.elapsed();

        self.status.enter(WorkerPhase::Publishing);
        self.registry.publish(WorkResult {
            correlation_id: item.id,
            worker_id,
            outcome,
            queued,
            execution,
        });
        self.status.processed.fetch_add(1, Ordering::AcqRel);
    }
}
