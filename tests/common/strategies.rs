use proptest::prelude::*;
use resolver_gateway::constants::error_codes;
use resolver_gateway::constants::operations as ops;

/// Native error codes an engine call may report, known and unknown
pub fn native_error_code_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(error_codes::DATABASE_CONNECTION_LOST),
        Just(error_codes::DATABASE_CONNECTION_FAILURE),
        Just(error_codes::STATEMENT_ON_INVALID_CONNECTION),
        Just(error_codes::CONFIGURATION_NOT_CURRENT),
        Just(error_codes::UNKNOWN_RECORD),
        Just(error_codes::MISSING_REQUIRED_FIELD),
        Just(error_codes::INVALID_FLAGS),
        (1000i64..100_000).prop_filter("not a classified code", |c| {
            ![1006, 1007, 1008, 7221, 7223].contains(c)
        }),
    ]
}

/// Scripted outcome of one attempt: `None` succeeds, `Some(code)` fails
pub fn attempt_strategy() -> impl Strategy<Value = Option<i64>> {
    prop::option::weighted(0.7, native_error_code_strategy())
}

/// A queue of attempt outcomes, longer than any call may consume
pub fn failure_script_strategy() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(attempt_strategy(), 1..6)
}

/// Operations registered as Unsupported, lifecycle ones included
pub fn unsupported_operation_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(ops::INIT),
        Just(ops::DESTROY),
        Just(ops::REINIT),
        Just(ops::GET_ACTIVE_CONFIG_ID),
    ]
}

/// Names the classification table does not know
pub fn unknown_operation_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{2,30}".prop_filter("must not be a known operation", |name| {
        !KNOWN_OPERATIONS.contains(&name.as_str())
    })
}

/// Whether the generated attempt sequence refreshes the engine between attempts
pub fn refresh_strategy() -> impl Strategy<Value = bool> {
    any::<bool>()
}

const KNOWN_OPERATIONS: &[&str] = &[
    ops::ADD_RECORD,
    ops::DELETE_RECORD,
    ops::REEVALUATE_RECORD,
    ops::REEVALUATE_ENTITY,
    ops::GET_RECORD,
    ops::GET_ENTITY_BY_RECORD_ID,
    ops::GET_ENTITY_BY_ENTITY_ID,
    ops::GET_VIRTUAL_ENTITY_BY_RECORD_ID,
    ops::SEARCH_BY_ATTRIBUTES,
    ops::FIND_PATH_BY_ENTITY_ID,
    ops::FIND_PATH_BY_RECORD_ID,
    ops::FIND_NETWORK_BY_ENTITY_ID,
    ops::FIND_NETWORK_BY_RECORD_ID,
    ops::WHY_RECORDS,
    ops::WHY_ENTITIES,
    ops::WHY_RECORD_IN_ENTITY,
    ops::HOW_ENTITY_BY_ENTITY_ID,
    ops::PROCESS_REDO_RECORD,
    ops::GET_REDO_RECORD,
    ops::COUNT_REDO_RECORDS,
    ops::GET_STATS,
    ops::PRIME_ENGINE,
    ops::EXPORT_JSON_ENTITY_REPORT,
    ops::EXPORT_CSV_ENTITY_REPORT,
    ops::FETCH_NEXT,
    ops::CLOSE_EXPORT,
    ops::INIT,
    ops::DESTROY,
    ops::REINIT,
    ops::GET_ACTIVE_CONFIG_ID,
];
