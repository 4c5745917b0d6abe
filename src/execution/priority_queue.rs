//! # Priority Dispatch Queue
//!
//! Multi-tier FIFO shared by the dispatch workers. Tiers are scanned in
//! declared order, so any eligible `Interactive` item is taken before any
//! `Standard` item, and `Standard` before `Redo`. Within a tier the first item
//! the worker is eligible for wins: its affinity is unset or names the worker,
//! and the worker serves its capability.
//!
//! Shutdown is a sentinel entry at the tail of the lowest tier. It only becomes
//! eligible once no work item is left in any tier, so a worker with nothing it
//! may take keeps waiting while another worker still has pinned or
//! capability-restricted work queued. The worker that takes it puts a fresh
//! sentinel back so the next worker stops too.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::dispatcher::{WorkerPhase, WorkerStatus};
use crate::config::WorkerProfile;
use crate::engine::EngineCapability;
use crate::error::{GatewayError, Result};

/// Queue tiers, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Latency-sensitive requests from API clients
    Interactive,
    #[default]
    Standard,
    /// Background redo processing
    Redo,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 3] = [
        PriorityTier::Interactive,
        PriorityTier::Standard,
        PriorityTier::Redo,
    ];

    fn index(self) -> usize {
        match self {
            PriorityTier::Interactive => 0,
            PriorityTier::Standard => 1,
            PriorityTier::Redo => 2,
        }
    }
}

/// One unit of dispatch work
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub operation: String,
    pub tier: PriorityTier,
    pub affinity: Option<usize>,
    pub capability: EngineCapability,
    pub args: Arc<Vec<Value>>,
    pub created_at: Instant,
}

impl WorkItem {
    pub fn new(
        operation: impl Into<String>,
        tier: PriorityTier,
        capability: EngineCapability,
        args: Arc<Vec<Value>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            tier,
            affinity: None,
            capability,
            args,
            created_at: Instant::now(),
        }
    }

    pub fn with_affinity(mut self, worker_id: usize) -> Self {
        self.affinity = Some(worker_id);
        self
    }

    fn eligible_for(&self, profile: &WorkerProfile) -> bool {
        self.affinity.map_or(true, |id| id == profile.worker_id) && profile.serves(self.capability)
    }
}

#[derive(Debug)]
pub(crate) enum QueueEntry {
    Work(WorkItem),
    Sentinel,
}

#[derive(Debug, Default)]
struct QueueState {
    tiers: [VecDeque<QueueEntry>; 3],
    shutdown: bool,
}

/// Blocking multi-tier queue shared by all dispatch workers
#[derive(Debug, Default)]
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a work item to its tier; refused once shutdown has begun
    pub fn enqueue(&self, item: WorkItem) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(GatewayError::QueueShutdown);
        }
        state.tiers[item.tier.index()].push_back(QueueEntry::Work(item));
        drop(state);

        // Waiting workers have different eligibility, wake all of them
        self.available.notify_all();
        Ok(())
    }

    /// Refuse further work and append the shutdown sentinel.
    ///
    /// Returns `false` if shutdown had already begun.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.shutdown = true;
        state.tiers[PriorityTier::Redo.index()].push_back(QueueEntry::Sentinel);
        drop(state);

        self.available.notify_all();
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub(crate) fn requeue_sentinel(&self) {
        self.state.lock().tiers[PriorityTier::Redo.index()].push_back(QueueEntry::Sentinel);
        self.available.notify_all();
    }

    /// Block until an entry this worker may take is available and remove it
    pub(crate) fn take(&self, profile: &WorkerProfile, status: &WorkerStatus) -> QueueEntry {
        let mut state = self.state.lock();
        loop {
            status.enter(WorkerPhase::Dequeuing);
            if let Some(entry) = Self::remove_first_eligible(&mut state, profile) {
                if state.shutdown && matches!(entry, QueueEntry::Work(_)) {
                    // Idle workers may now be free to take the sentinel
                    self.available.notify_all();
                }
                return entry;
            }
            status.enter(WorkerPhase::WaitingForWork);
            self.available.wait(&mut state);
        }
    }

    fn remove_first_eligible(
        state: &mut QueueState,
        profile: &WorkerProfile,
    ) -> Option<QueueEntry> {
        let work_remaining = state
            .tiers
            .iter()
            .flatten()
            .any(|entry| matches!(entry, QueueEntry::Work(_)));

        for tier in state.tiers.iter_mut() {
            let position = tier.iter().position(|entry| match entry {
                QueueEntry::Work(item) => item.eligible_for(profile),
                QueueEntry::Sentinel => !work_remaining,
            });
            if let Some(position) = position {
                return tier.remove(position);
            }
        }
        None
    }

    /// Remove a work item no worker has taken yet.
    ///
    /// Returns `false` when the item is already executing or finished.
    pub fn withdraw(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let found = state.tiers.iter().enumerate().find_map(|(tier, entries)| {
            entries
                .iter()
                .position(|entry| matches!(entry, QueueEntry::Work(item) if item.id == id))
                .map(|position| (tier, position))
        });

        let Some((tier, position)) = found else {
            return false;
        };
        state.tiers[tier].remove(position);
        drop(state);

        // During shutdown this may have been the last item holding back the sentinel
        self.available.notify_all();
        true
    }

    /// Work items waiting, sentinels excluded
    pub fn len(&self) -> usize {
        self.depth_by_tier().iter().map(|(_, depth)| depth).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth_by_tier(&self) -> Vec<(PriorityTier, usize)> {
        let state = self.state.lock();
        PriorityTier::ALL
            .iter()
            .map(|tier| {
                let depth = state.tiers[tier.index()]
                    .iter()
                    .filter(|entry| matches!(entry, QueueEntry::Work(_)))
                    .count();
                (*tier, depth)
            })
            .collect()
    }
}
