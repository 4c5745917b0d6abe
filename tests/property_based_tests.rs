mod common;

use common::strategies::*;
use proptest::prelude::*;
use resolver_gateway::constants::operations as ops;
use resolver_gateway::engine::{ConfigGeneration, OperationSignature, ResultShape};
use resolver_gateway::registry::{OperationClassifier, OperationPolicy};
use resolver_gateway::resilience::{classify_native_code, ErrorClass};
use resolver_gateway::test_helpers::{scripted_gateway, EngineScript, ScriptedResponse};
use serde_json::json;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a retryable call reaches the engine at most twice, and twice
    /// only when the first failure was reconnect-class or the config was refreshed
    #[test]
    fn retryable_calls_invoke_at_most_twice(
        script in failure_script_strategy(),
        stale in refresh_strategy(),
    ) {
        let engine = Arc::new(EngineScript::new());
        for attempt in &script {
            let response = match attempt {
                None => ScriptedResponse::success("{}"),
                Some(code) => ScriptedResponse::failure(*code, "scripted failure"),
            };
            engine.push(ops::GET_RECORD, response);
        }

        let gateway = scripted_gateway(&engine, 1);
        if stale {
            gateway.authority.set_default_generation(ConfigGeneration(2));
        }

        let result = runtime().block_on(
            gateway
                .caller
                .call(ops::GET_RECORD, vec![json!("CUSTOMERS"), json!("1001"), json!(0)]),
        );
        let invocations = engine.invocations(ops::GET_RECORD);
        prop_assert!(invocations <= 2);

        let expected = match script[0] {
            None => 1,
            Some(code) if classify_native_code(code) == ErrorClass::ReconnectRequired || stale => 2,
            Some(_) => 1,
        };
        prop_assert_eq!(invocations, expected);

        let last = script.get(invocations - 1).copied().flatten();
        prop_assert_eq!(result.is_ok(), last.is_none());
    }

    /// Property: operations registered as Unsupported always classify Unsupported
    #[test]
    fn registered_unsupported_operations_classify_unsupported(
        name in unsupported_operation_strategy(),
    ) {
        let classifier =
            OperationClassifier::build(&OperationClassifier::expected_surface()).unwrap();
        prop_assert_eq!(classifier.classify(name).policy, OperationPolicy::Unsupported);
    }

    /// Property: names the table does not know are refused, exposed by the engine or not
    #[test]
    fn unknown_operations_classify_unsupported(
        name in unknown_operation_strategy(),
        exposed in any::<bool>(),
    ) {
        let mut surface = OperationClassifier::expected_surface();
        if exposed {
            surface.push(OperationSignature::new(name.clone(), ResultShape::StatusCode));
        }
        let classifier = OperationClassifier::build(&surface).unwrap();
        prop_assert_eq!(classifier.classify(&name).policy, OperationPolicy::Unsupported);
        prop_assert_eq!(classifier.report().unclassified.contains(&name), exposed);
    }

    /// Property: every native code maps onto exactly one class, unknown ones onto Fatal
    #[test]
    fn native_codes_always_classify(code in any::<i64>()) {
        let class = classify_native_code(code);
        if ![2, 7, 23, 33, 37, 48, 87, 1006, 1007, 1008, 7221, 7223].contains(&code) {
            prop_assert_eq!(class, ErrorClass::Fatal);
        }
    }
}

#[tokio::test]
async fn unsupported_operations_never_reach_the_engine() {
    let engine = common::new_script();
    let gateway = scripted_gateway(&engine, 1);

    for name in [ops::INIT, ops::DESTROY, ops::REINIT, ops::GET_ACTIVE_CONFIG_ID] {
        let err = gateway.caller.call(name, vec![]).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
    }
    assert_eq!(engine.total_invocations(), 0);
}
