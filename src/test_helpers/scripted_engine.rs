//! Scripted stand-in for the native resolution engine.
//!
//! Every handle created from one [`EngineScript`] shares its queued responses
//! and invocation counters, so a test can script a sequence of outcomes and
//! then assert how often each operation actually reached "the engine".

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::error_codes::STATUS_OK;
use crate::engine::{Engine, EngineFactory, OperationSignature};
use crate::error::Result;
use crate::registry::OperationClassifier;

/// Native status returned by scripted failures
pub const SCRIPTED_FAILURE_STATUS: i32 = -2;

type Responder = dyn Fn(&str, &[Value]) -> Option<ScriptedResponse> + Send + Sync;

/// One scripted native result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResponse {
    pub status: i32,
    pub payload: String,
    pub error_code: i64,
    pub error_message: String,
    pub delay: Option<Duration>,
}

impl ScriptedResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            payload: payload.into(),
            error_code: 0,
            error_message: String::new(),
            delay: None,
        }
    }

    pub fn failure(error_code: i64, message: impl Into<String>) -> Self {
        Self {
            status: SCRIPTED_FAILURE_STATUS,
            payload: String::new(),
            error_code,
            error_message: message.into(),
            delay: None,
        }
    }

    /// Block the invoking thread for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Shared script driving any number of [`ScriptedEngine`] handles
pub struct EngineScript {
    queued: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    invocations: Mutex<HashMap<String, usize>>,
    responder: RwLock<Option<Arc<Responder>>>,
    surface: RwLock<Vec<OperationSignature>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl std::fmt::Debug for EngineScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineScript")
            .field("invocations", &*self.invocations.lock())
            .field("max_active", &self.max_active.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for EngineScript {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineScript {
    /// Script exposing the full classified surface, answering `{}` by default
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            invocations: Mutex::new(HashMap::new()),
            responder: RwLock::new(None),
            surface: RwLock::new(OperationClassifier::expected_surface()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Queue the next response for `operation`
    pub fn push(&self, operation: &str, response: ScriptedResponse) {
        self.queued
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answer calls through a closure; `None` falls through to the queue
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &[Value]) -> Option<ScriptedResponse> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Arc::new(responder));
    }

    /// Replace the operations the scripted engine claims to expose
    pub fn set_surface(&self, surface: Vec<OperationSignature>) {
        *self.surface.write() = surface;
    }

    pub fn surface(&self) -> Vec<OperationSignature> {
        self.surface.read().clone()
    }

    pub fn invocations(&self, operation: &str) -> usize {
        self.invocations.lock().get(operation).copied().unwrap_or(0)
    }

    pub fn total_invocations(&self) -> usize {
        self.invocations.lock().values().sum()
    }

    /// Highest number of calls observed executing at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// New engine handle bound to this script
    pub fn engine(self: &Arc<Self>) -> ScriptedEngine {
        ScriptedEngine {
            script: Arc::clone(self),
            last_error: None,
        }
    }

    fn respond(&self, operation: &str, args: &[Value]) -> ScriptedResponse {
        *self
            .invocations
            .lock()
            .entry(operation.to_string())
            .or_insert(0) += 1;

        let responder = self.responder.read().clone();
        if let Some(responder) = responder {
            if let Some(response) = responder(operation, args) {
                return response;
            }
        }

        self.queued
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ScriptedResponse::success("{}"))
    }
}

/// Engine handle answering from an [`EngineScript`]
pub struct ScriptedEngine {
    script: Arc<EngineScript>,
    last_error: Option<(i64, String)>,
}

impl Engine for ScriptedEngine {
    fn invoke(&mut self, operation: &str, args: &[Value], response: &mut String) -> i32 {
        let scripted = self.script.respond(operation, args);

        let now = self.script.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = scripted.delay {
            std::thread::sleep(delay);
        }
        self.script.active.fetch_sub(1, Ordering::SeqCst);

        response.push_str(&scripted.payload);
        if scripted.status != STATUS_OK {
            self.last_error = Some((scripted.error_code, scripted.error_message));
        }
        scripted.status
    }

    fn last_error_code(&self) -> i64 {
        self.last_error.as_ref().map(|(code, _)| *code).unwrap_or(0)
    }

    fn last_error_message(&self) -> String {
        self.last_error
            .as_ref()
            .map(|(_, message)| message.clone())
            .unwrap_or_default()
    }

    fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    fn surface(&self) -> Vec<OperationSignature> {
        self.script.surface()
    }
}

/// Factory handing out scripted handles, one per slot
#[derive(Debug)]
pub struct ScriptedEngineFactory {
    script: Arc<EngineScript>,
    created: AtomicUsize,
}

impl ScriptedEngineFactory {
    pub fn new(script: Arc<EngineScript>) -> Self {
        Self {
            script,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, _slot: usize) -> Result<Box<dyn Engine>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.script.engine()))
    }
}
