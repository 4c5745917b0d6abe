//! Background reconciler driving a real staleness monitor.

mod common;

use resolver_gateway::config::ReconcilerConfig;
use resolver_gateway::engine::{ConfigAuthority, ConfigGeneration};
use resolver_gateway::resilience::{BackgroundReconciler, ReconcilerState};
use resolver_gateway::test_helpers::scripted_gateway;
use std::time::Duration;

fn reconciler_config(max_consecutive_failures: u32) -> ReconcilerConfig {
    ReconcilerConfig {
        enabled: true,
        period_seconds: 1,
        max_consecutive_failures,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconciler_picks_up_new_default_without_traffic() {
    let script = common::new_script();
    let gateway = scripted_gateway(&script, 1);
    let reconciler = BackgroundReconciler::spawn(gateway.monitor.clone(), &reconciler_config(3));

    gateway.authority.set_default_generation(ConfigGeneration(4));

    let authority = gateway.authority.clone();
    assert!(
        common::wait_until(Duration::from_secs(3), || {
            authority.active_generation().ok() == Some(ConfigGeneration(4))
        })
        .await
    );
    assert_eq!(script.total_invocations(), 0);

    reconciler.stop(Duration::from_secs(2)).await.unwrap();
    assert_eq!(reconciler.state(), ReconcilerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconciler_abandons_after_repeated_failures() {
    let script = common::new_script();
    let gateway = scripted_gateway(&script, 1);
    gateway.authority.set_read_failure(true);

    let reconciler = BackgroundReconciler::spawn(gateway.monitor.clone(), &reconciler_config(0));

    assert!(
        common::wait_until(Duration::from_secs(3), || {
            reconciler.state() == ReconcilerState::Abandoned
        })
        .await
    );
    assert_eq!(reconciler.consecutive_failures(), 1);
    assert_eq!(gateway.monitor.stats().failures, 1);

    // Stopping an abandoned loop is a no-op
    reconciler.stop(Duration::from_secs(1)).await.unwrap();
}
