// Test Helpers Module - Scripted Engine Infrastructure
//
// Shared doubles for the native engine and its configuration authority, used
// by unit tests, integration tests and benchmarks. Nothing here touches a real
// engine build.

pub mod scripted_authority;
pub mod scripted_engine;

pub use scripted_authority::{ScriptedAuthority, SCRIPTED_REINITIALIZE_FAILURE};
pub use scripted_engine::{
    EngineScript, ScriptedEngine, ScriptedEngineFactory, ScriptedResponse,
    SCRIPTED_FAILURE_STATUS,
};

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{ConfigGeneration, EngineContext};
use crate::execution::BoundedEngineExecutor;
use crate::registry::OperationClassifier;
use crate::resilience::{ConfigStalenessMonitor, RetryingCaller};

/// Generation both scripted generations start at
pub const INITIAL_GENERATION: ConfigGeneration = ConfigGeneration(1);

/// Fully wired gateway over a scripted engine
pub struct ScriptedGateway {
    pub authority: Arc<ScriptedAuthority>,
    pub context: Arc<EngineContext>,
    pub monitor: Arc<ConfigStalenessMonitor>,
    pub executor: Arc<BoundedEngineExecutor>,
    pub caller: Arc<RetryingCaller>,
}

/// Wire classifier, executor, staleness monitor and retrying caller around `script`.
///
/// The monitor has no cache window, so every check reaches the authority.
pub fn scripted_gateway(script: &Arc<EngineScript>, slots: usize) -> ScriptedGateway {
    scripted_gateway_with_authority(
        script,
        slots,
        Arc::new(ScriptedAuthority::new(INITIAL_GENERATION)),
    )
}

/// [`scripted_gateway`] around a pre-configured authority
pub fn scripted_gateway_with_authority(
    script: &Arc<EngineScript>,
    slots: usize,
    authority: Arc<ScriptedAuthority>,
) -> ScriptedGateway {
    let context = Arc::new(EngineContext::new("scripted", authority.clone()));
    context
        .initialize()
        .expect("scripted engine context should initialize");

    let classifier = Arc::new(
        OperationClassifier::build(&script.surface())
            .expect("scripted surface should classify"),
    );
    let factory = ScriptedEngineFactory::new(Arc::clone(script));
    let executor = Arc::new(
        BoundedEngineExecutor::start(&factory, slots).expect("scripted executor should start"),
    );
    let monitor = Arc::new(ConfigStalenessMonitor::new(
        Arc::clone(&context),
        Duration::ZERO,
    ));
    let caller = Arc::new(RetryingCaller::new(
        classifier,
        executor.clone(),
        monitor.clone(),
    ));

    ScriptedGateway {
        authority,
        context,
        monitor,
        executor,
        caller,
    }
}
