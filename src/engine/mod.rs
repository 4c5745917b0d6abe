//! # Engine Collaborator Interfaces
//!
//! The resolution engine and its configuration authority are external
//! collaborators. This module defines the narrow, synchronous surface the
//! gateway consumes from them, plus the [`EngineContext`] that owns the engine
//! lifecycle.
//!
//! ## Ownership
//!
//! Engine handles are created by an [`EngineFactory`] and handed to exactly one
//! executor slot or dispatch worker. Nothing else calls [`Engine::invoke`].
//! Handles are `Send` but never shared: the native engine may not tolerate
//! concurrent calls on one handle.

pub mod context;
pub mod types;

pub use context::{EngineContext, LifecycleState};
pub use types::{
    ArgKind, ArgSpec, ConfigGeneration, EngineCapability, NativeError, NativeOutcome,
    OperationSignature, ResultShape,
};

use crate::error::Result;
use serde_json::Value;

/// One handle onto the native resolution engine
pub trait Engine: Send {
    /// Invoke a named operation, writing any output into `response`.
    ///
    /// Returns the native status code; zero means success.
    fn invoke(&mut self, operation: &str, args: &[Value], response: &mut String) -> i32;

    /// Error code of the most recent failed call on this handle
    fn last_error_code(&self) -> i64;

    /// Error message of the most recent failed call on this handle
    fn last_error_message(&self) -> String;

    /// Reset the last-error state before a new call
    fn clear_last_error(&mut self);

    /// Operations this engine build exposes
    fn surface(&self) -> Vec<OperationSignature>;
}

/// Authority over which configuration generation the engine should run
pub trait ConfigAuthority: Send + Sync {
    /// Generation the engine currently has loaded
    fn active_generation(&self) -> std::result::Result<ConfigGeneration, NativeError>;

    /// Generation the authority currently designates as default
    fn default_generation(&self) -> std::result::Result<ConfigGeneration, NativeError>;

    /// Reload the engine with the given generation, returning a native status code
    fn reinitialize(&self, generation: ConfigGeneration) -> i32;
}

/// Creates engine handles for executor slots and dispatch workers
pub trait EngineFactory: Send + Sync {
    fn create(&self, slot: usize) -> Result<Box<dyn Engine>>;
}
