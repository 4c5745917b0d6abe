//! # Engine Context
//!
//! Explicit owner of the engine lifecycle. Components receive an
//! `Arc<EngineContext>` at construction time instead of reaching for global
//! state, and lifecycle transitions (initialize, reinitialize, destroy) are
//! methods here rather than reassignments of shared fields.
//!
//! A context allows exactly one active engine at a time: `initialize` on an
//! already active context is rejected.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{ConfigAuthority, ConfigGeneration, NativeError};
use crate::constants::error_codes::STATUS_OK;
use crate::error::{GatewayError, Result};

/// Lifecycle state of the engine owned by a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Active { generation: ConfigGeneration },
    Destroyed,
}

/// Owner of the authority handle and the engine lifecycle
pub struct EngineContext {
    name: String,
    authority: Arc<dyn ConfigAuthority>,
    state: Mutex<LifecycleState>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl EngineContext {
    pub fn new(name: impl Into<String>, authority: Arc<dyn ConfigAuthority>) -> Self {
        Self {
            name: name.into(),
            authority,
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    /// Name used in logs for this engine instance
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), LifecycleState::Active { .. })
    }

    /// Mark the engine active at the generation it currently has loaded
    pub fn initialize(&self) -> Result<ConfigGeneration> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Active { generation } => {
                return Err(GatewayError::Lifecycle(format!(
                    "engine '{}' is already active at generation {generation}",
                    self.name
                )));
            }
            LifecycleState::Destroyed => {
                return Err(GatewayError::Lifecycle(format!(
                    "engine '{}' has been destroyed",
                    self.name
                )));
            }
            LifecycleState::Uninitialized => {}
        }

        let generation = self.authority.active_generation().map_err(|e| {
            GatewayError::Lifecycle(format!(
                "unable to read active generation for '{}': {e}",
                self.name
            ))
        })?;

        *state = LifecycleState::Active { generation };
        info!(
            engine = %self.name,
            generation = %generation,
            "🚀 ENGINE: Initialized"
        );
        Ok(generation)
    }

    /// Generation the engine has loaded, as reported by the authority
    pub fn active_generation(&self) -> std::result::Result<ConfigGeneration, NativeError> {
        self.authority.active_generation()
    }

    /// Generation the authority currently designates as default
    pub fn default_generation(&self) -> std::result::Result<ConfigGeneration, NativeError> {
        self.authority.default_generation()
    }

    /// Reload the active engine with `generation`
    pub fn reinitialize(&self, generation: ConfigGeneration) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(*state, LifecycleState::Active { .. }) {
            return Err(GatewayError::Lifecycle(format!(
                "cannot reinitialize engine '{}' in state {:?}",
                self.name, *state
            )));
        }

        let status = self.authority.reinitialize(generation);
        if status != STATUS_OK {
            error!(
                engine = %self.name,
                generation = %generation,
                status = status,
                "❌ ENGINE: Reinitialize failed"
            );
            return Err(GatewayError::Lifecycle(format!(
                "reinitialize to generation {generation} failed with status {status}"
            )));
        }

        *state = LifecycleState::Active { generation };
        info!(
            engine = %self.name,
            generation = %generation,
            "🔄 ENGINE: Reinitialized"
        );
        Ok(())
    }

    /// Tear the engine down; the context cannot be reused afterwards
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Active { .. } => {
                *state = LifecycleState::Destroyed;
                info!(engine = %self.name, "🛑 ENGINE: Destroyed");
                Ok(())
            }
            LifecycleState::Uninitialized => {
                warn!(engine = %self.name, "Destroy called on uninitialized engine");
                *state = LifecycleState::Destroyed;
                Ok(())
            }
            LifecycleState::Destroyed => Err(GatewayError::Lifecycle(format!(
                "engine '{}' already destroyed",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedAuthority;

    #[test]
    fn test_single_active_engine() {
        let authority = Arc::new(ScriptedAuthority::new(ConfigGeneration(1)));
        let context = EngineContext::new("test", authority);

        assert_eq!(context.initialize().unwrap(), ConfigGeneration(1));
        assert!(context.is_active());
        assert!(matches!(
            context.initialize(),
            Err(GatewayError::Lifecycle(_))
        ));
    }

    #[test]
    fn test_reinitialize_updates_generation() {
        let authority = Arc::new(ScriptedAuthority::new(ConfigGeneration(1)));
        authority.set_default_generation(ConfigGeneration(2));
        let context = EngineContext::new("test", authority.clone());
        context.initialize().unwrap();

        context.reinitialize(ConfigGeneration(2)).unwrap();
        assert_eq!(
            context.state(),
            LifecycleState::Active {
                generation: ConfigGeneration(2)
            }
        );
        assert_eq!(authority.active_generation().unwrap(), ConfigGeneration(2));
    }

    #[test]
    fn test_reinitialize_requires_active_engine() {
        let authority = Arc::new(ScriptedAuthority::new(ConfigGeneration(1)));
        let context = EngineContext::new("test", authority);
        assert!(context.reinitialize(ConfigGeneration(2)).is_err());
    }

    #[test]
    fn test_destroy_is_terminal() {
        let authority = Arc::new(ScriptedAuthority::new(ConfigGeneration(1)));
        let context = EngineContext::new("test", authority);
        context.initialize().unwrap();
        context.destroy().unwrap();

        assert_eq!(context.state(), LifecycleState::Destroyed);
        assert!(context.initialize().is_err());
        assert!(context.destroy().is_err());
    }
}
