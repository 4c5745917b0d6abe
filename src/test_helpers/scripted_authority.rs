//! Scripted configuration authority with controllable generations and faults.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::constants::error_codes::{DATABASE_CONNECTION_LOST, STATUS_OK};
use crate::engine::{ConfigAuthority, ConfigGeneration, NativeError};

/// Native status returned by a scripted reinitialize failure
pub const SCRIPTED_REINITIALIZE_FAILURE: i32 = -1;

#[derive(Debug)]
pub struct ScriptedAuthority {
    active: Mutex<ConfigGeneration>,
    default: Mutex<ConfigGeneration>,
    fail_reinitialize: AtomicBool,
    fail_reads: AtomicBool,
    reinitialize_delay: Duration,
    reinitialize_calls: AtomicUsize,
    reinitializing: AtomicUsize,
    max_concurrent_reinitialize: AtomicUsize,
}

impl ScriptedAuthority {
    /// Authority whose active and default generations both start at `generation`
    pub fn new(generation: ConfigGeneration) -> Self {
        Self {
            active: Mutex::new(generation),
            default: Mutex::new(generation),
            fail_reinitialize: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            reinitialize_delay: Duration::ZERO,
            reinitialize_calls: AtomicUsize::new(0),
            reinitializing: AtomicUsize::new(0),
            max_concurrent_reinitialize: AtomicUsize::new(0),
        }
    }

    /// Make every reinitialize block for `delay`
    pub fn with_reinitialize_delay(mut self, delay: Duration) -> Self {
        self.reinitialize_delay = delay;
        self
    }

    /// Simulate an operator publishing a new default configuration
    pub fn set_default_generation(&self, generation: ConfigGeneration) {
        *self.default.lock() = generation;
    }

    pub fn set_reinitialize_failure(&self, fail: bool) {
        self.fail_reinitialize.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn reinitialize_calls(&self) -> usize {
        self.reinitialize_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_reinitialize(&self) -> usize {
        self.max_concurrent_reinitialize.load(Ordering::SeqCst)
    }

    fn read(&self, generation: &Mutex<ConfigGeneration>) -> Result<ConfigGeneration, NativeError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NativeError {
                code: DATABASE_CONNECTION_LOST,
                message: "configuration store unavailable".to_string(),
            });
        }
        Ok(*generation.lock())
    }
}

impl ConfigAuthority for ScriptedAuthority {
    fn active_generation(&self) -> Result<ConfigGeneration, NativeError> {
        self.read(&self.active)
    }

    fn default_generation(&self) -> Result<ConfigGeneration, NativeError> {
        self.read(&self.default)
    }

    fn reinitialize(&self, generation: ConfigGeneration) -> i32 {
        self.reinitialize_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.reinitializing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_reinitialize
            .fetch_max(now, Ordering::SeqCst);

        if !self.reinitialize_delay.is_zero() {
            std::thread::sleep(self.reinitialize_delay);
        }

        let status = if self.fail_reinitialize.load(Ordering::SeqCst) {
            SCRIPTED_REINITIALIZE_FAILURE
        } else {
            *self.active.lock() = generation;
            STATUS_OK
        };

        self.reinitializing.fetch_sub(1, Ordering::SeqCst);
        status
    }
}
