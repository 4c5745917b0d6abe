//! # Operation Classifier
//!
//! Static table mapping every engine operation this layer knows about to a
//! dispatch policy, validated once at startup against the surface the linked
//! engine actually exposes.
//!
//! ## Policies
//!
//! - **Direct**: call once and hand the native status back untouched. Used for
//!   report/export primitives whose failure semantics the caller interprets.
//! - **Retryable**: call, classify a failure, possibly refresh configuration
//!   and retry once. Only operations that report failure through a status code
//!   may be retryable.
//! - **Unsupported**: refuse immediately. Lifecycle operations are always in
//!   this set because the engine context owns them.
//!
//! Operations the engine exposes but the table does not know are "not yet
//! classified": logged once at startup and refused, so a newer engine build
//! keeps working. Table operations missing from an older engine are refused
//! the same way.

use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::constants::operations as ops;
use crate::engine::{ArgKind, ArgSpec, EngineCapability, OperationSignature, ResultShape};
use crate::error::{GatewayError, Result};

/// How the gateway dispatches an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPolicy {
    Direct,
    Retryable,
    Unsupported,
}

/// Whether the linked engine actually exposes an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Known to the table and present on the engine surface
    Available,
    /// Known to the table but absent from the engine surface
    MissingFromEngine,
    /// Not known to the table
    Unrecognized,
}

/// Immutable description of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub args: &'static [ArgSpec],
    pub result: ResultShape,
    /// Effective policy after validation against the engine surface
    pub policy: OperationPolicy,
    pub capability: EngineCapability,
    pub availability: Availability,
}

impl OperationDescriptor {
    fn unrecognized(name: &str, result: ResultShape) -> Self {
        Self {
            name: name.to_string(),
            args: &[],
            result,
            policy: OperationPolicy::Unsupported,
            capability: EngineCapability::Query,
            availability: Availability::Unrecognized,
        }
    }

    /// Check positional arguments against the declared argument shape
    pub fn validate_args(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.args.len() {
            return Err(GatewayError::InvalidArguments {
                operation: self.name.clone(),
                reason: format!(
                    "expected {} arguments, got {}",
                    self.args.len(),
                    args.len()
                ),
            });
        }

        for (arg, value) in self.args.iter().zip(args) {
            if !arg.kind.accepts(value) {
                return Err(GatewayError::InvalidArguments {
                    operation: self.name.clone(),
                    reason: format!("argument '{}' must be {:?}", arg.name, arg.kind),
                });
            }
        }

        Ok(())
    }
}

/// Outcome of validating the table against an engine surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifierReport {
    pub classified: usize,
    pub unclassified: Vec<String>,
    pub missing_from_engine: Vec<String>,
}

struct OperationSpec {
    name: &'static str,
    args: &'static [ArgSpec],
    result: ResultShape,
    policy: OperationPolicy,
    capability: EngineCapability,
}

const DATA_SOURCE: ArgSpec = ArgSpec::new("data_source", ArgKind::Text);
const RECORD_ID: ArgSpec = ArgSpec::new("record_id", ArgKind::Text);
const ENTITY_ID: ArgSpec = ArgSpec::new("entity_id", ArgKind::Integer);
const FLAGS: ArgSpec = ArgSpec::new("flags", ArgKind::Flags);
const MAX_DEGREES: ArgSpec = ArgSpec::new("max_degrees", ArgKind::Integer);
const EXPORT_HANDLE: ArgSpec = ArgSpec::new("export_handle", ArgKind::Integer);
const RECORD_DEFINITION: ArgSpec = ArgSpec::new("record_definition", ArgKind::Json);
const RECORD_KEYS: ArgSpec = ArgSpec::new("record_keys", ArgKind::Json);
const BUILD_OUT_DEGREES: ArgSpec = ArgSpec::new("build_out_degrees", ArgKind::Integer);
const MAX_ENTITIES: ArgSpec = ArgSpec::new("max_entities", ArgKind::Integer);

macro_rules! op {
    ($name:expr, [$($arg:expr),* $(,)?], $result:ident, $policy:ident, $capability:ident) => {
        OperationSpec {
            name: $name,
            args: &[$($arg),*],
            result: ResultShape::$result,
            policy: OperationPolicy::$policy,
            capability: EngineCapability::$capability,
        }
    };
}

#[rustfmt::skip]
const OPERATION_TABLE: &[OperationSpec] = &[
    op!(
        ops::ADD_RECORD,
        [DATA_SOURCE, RECORD_ID, RECORD_DEFINITION, FLAGS],
        StatusCode,
        Retryable,
        Resolver
    ),
    op!(ops::DELETE_RECORD, [DATA_SOURCE, RECORD_ID, FLAGS], StatusCode, Retryable, Resolver),
    op!(ops::REEVALUATE_RECORD, [DATA_SOURCE, RECORD_ID, FLAGS], StatusCode, Retryable, Resolver),
    op!(ops::REEVALUATE_ENTITY, [ENTITY_ID, FLAGS], StatusCode, Retryable, Resolver),
    op!(ops::GET_RECORD, [DATA_SOURCE, RECORD_ID, FLAGS], StatusCode, Retryable, Query),
    op!(
        ops::GET_ENTITY_BY_RECORD_ID,
        [DATA_SOURCE, RECORD_ID, FLAGS],
        StatusCode,
        Retryable,
        Query
    ),
    op!(ops::GET_ENTITY_BY_ENTITY_ID, [ENTITY_ID, FLAGS], StatusCode, Retryable, Query),
    op!(ops::GET_VIRTUAL_ENTITY_BY_RECORD_ID, [RECORD_KEYS, FLAGS], StatusCode, Retryable, Query),
    op!(
        ops::SEARCH_BY_ATTRIBUTES,
        [
            ArgSpec::new("attributes", ArgKind::Json),
            ArgSpec::new("search_profile", ArgKind::Text),
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Query
    ),
    op!(
        ops::FIND_PATH_BY_ENTITY_ID,
        [
            ArgSpec::new("start_entity_id", ArgKind::Integer),
            ArgSpec::new("end_entity_id", ArgKind::Integer),
            MAX_DEGREES,
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Query
    ),
    op!(
        ops::FIND_PATH_BY_RECORD_ID,
        [
            ArgSpec::new("start_data_source", ArgKind::Text),
            ArgSpec::new("start_record_id", ArgKind::Text),
            ArgSpec::new("end_data_source", ArgKind::Text),
            ArgSpec::new("end_record_id", ArgKind::Text),
            MAX_DEGREES,
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Query
    ),
    op!(
        ops::FIND_NETWORK_BY_ENTITY_ID,
        [
            ArgSpec::new("entity_ids", ArgKind::Json),
            MAX_DEGREES,
            BUILD_OUT_DEGREES,
            MAX_ENTITIES,
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Query
    ),
    op!(
        ops::FIND_NETWORK_BY_RECORD_ID,
        [RECORD_KEYS, MAX_DEGREES, BUILD_OUT_DEGREES, MAX_ENTITIES, FLAGS],
        StatusCode,
        Retryable,
        Query
    ),
    op!(
        ops::WHY_RECORDS,
        [
            ArgSpec::new("data_source_1", ArgKind::Text),
            ArgSpec::new("record_id_1", ArgKind::Text),
            ArgSpec::new("data_source_2", ArgKind::Text),
            ArgSpec::new("record_id_2", ArgKind::Text),
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Auditor
    ),
    op!(
        ops::WHY_ENTITIES,
        [
            ArgSpec::new("entity_id_1", ArgKind::Integer),
            ArgSpec::new("entity_id_2", ArgKind::Integer),
            FLAGS,
        ],
        StatusCode,
        Retryable,
        Auditor
    ),
    op!(ops::WHY_RECORD_IN_ENTITY, [DATA_SOURCE, RECORD_ID, FLAGS], StatusCode, Retryable, Auditor),
    op!(ops::HOW_ENTITY_BY_ENTITY_ID, [ENTITY_ID, FLAGS], StatusCode, Retryable, Auditor),
    op!(
        ops::PROCESS_REDO_RECORD,
        [ArgSpec::new("redo_record", ArgKind::Json), FLAGS],
        StatusCode,
        Retryable,
        Resolver
    ),
    op!(ops::GET_REDO_RECORD, [], StatusCode, Retryable, Resolver),
    op!(ops::COUNT_REDO_RECORDS, [], Value, Direct, Resolver),
    op!(ops::GET_STATS, [], StatusCode, Direct, Resolver),
    op!(ops::PRIME_ENGINE, [], StatusCode, Direct, Resolver),
    op!(ops::EXPORT_JSON_ENTITY_REPORT, [FLAGS], StatusCode, Direct, Query),
    op!(
        ops::EXPORT_CSV_ENTITY_REPORT,
        [ArgSpec::new("csv_column_list", ArgKind::Text), FLAGS],
        StatusCode,
        Direct,
        Query
    ),
    op!(ops::FETCH_NEXT, [EXPORT_HANDLE], StatusCode, Direct, Query),
    op!(ops::CLOSE_EXPORT, [EXPORT_HANDLE], StatusCode, Direct, Query),
    op!(
        ops::INIT,
        [
            ArgSpec::new("instance_name", ArgKind::Text),
            ArgSpec::new("settings", ArgKind::Json),
            ArgSpec::new("verbose_logging", ArgKind::Integer),
        ],
        StatusCode,
        Unsupported,
        Resolver
    ),
    op!(ops::DESTROY, [], StatusCode, Unsupported, Resolver),
    op!(
        ops::REINIT,
        [ArgSpec::new("config_id", ArgKind::Integer)],
        StatusCode,
        Unsupported,
        Resolver
    ),
    op!(ops::GET_ACTIVE_CONFIG_ID, [], Value, Unsupported, Resolver),
];

/// Startup-built, read-only operation policy table
#[derive(Debug)]
pub struct OperationClassifier {
    descriptors: HashMap<String, OperationDescriptor>,
    report: ClassifierReport,
    reported_unknown: DashSet<String>,
}

impl OperationClassifier {
    /// Build the classifier, validating the static table against `surface`
    pub fn build(surface: &[OperationSignature]) -> Result<Self> {
        validate_table()?;

        let exposed: HashMap<&str, ResultShape> = surface
            .iter()
            .map(|sig| (sig.name.as_str(), sig.result))
            .collect();

        let mut descriptors = HashMap::with_capacity(OPERATION_TABLE.len());
        let mut report = ClassifierReport::default();

        for entry in OPERATION_TABLE {
            let availability = match exposed.get(entry.name) {
                Some(shape) => {
                    if *shape != entry.result {
                        if entry.policy == OperationPolicy::Retryable {
                            return Err(GatewayError::Classification(format!(
                                "retryable operation '{}' is exposed with a {:?} result; \
                                 only status-code operations can be retried",
                                entry.name, shape
                            )));
                        }
                        warn!(
                            operation = entry.name,
                            expected = ?entry.result,
                            exposed = ?shape,
                            "Engine result shape differs from classification table"
                        );
                    }
                    Availability::Available
                }
                None => {
                    if entry.policy != OperationPolicy::Unsupported {
                        warn!(
                            operation = entry.name,
                            "⚠️ CLASSIFIER: Operation missing from engine surface, calls will be refused"
                        );
                        report.missing_from_engine.push(entry.name.to_string());
                    }
                    Availability::MissingFromEngine
                }
            };

            let policy = if availability == Availability::Available {
                entry.policy
            } else {
                OperationPolicy::Unsupported
            };

            descriptors.insert(
                entry.name.to_string(),
                OperationDescriptor {
                    name: entry.name.to_string(),
                    args: entry.args,
                    result: entry.result,
                    policy,
                    capability: entry.capability,
                    availability,
                },
            );
        }

        for sig in surface {
            if descriptors.contains_key(&sig.name) {
                continue;
            }
            info!(
                operation = %sig.name,
                "📋 CLASSIFIER: Engine exposes an operation that is not yet classified"
            );
            report.unclassified.push(sig.name.clone());
            descriptors.insert(
                sig.name.clone(),
                OperationDescriptor::unrecognized(&sig.name, sig.result),
            );
        }

        report.classified = descriptors
            .values()
            .filter(|d| d.availability == Availability::Available)
            .count();
        report.unclassified.sort();
        report.missing_from_engine.sort();

        info!(
            classified = report.classified,
            unclassified = report.unclassified.len(),
            missing = report.missing_from_engine.len(),
            "✅ CLASSIFIER: Operation table installed"
        );

        Ok(Self {
            descriptors,
            report,
            reported_unknown: DashSet::new(),
        })
    }

    /// Look up the descriptor for `name`.
    ///
    /// Unknown names yield an unrecognized descriptor with the `Unsupported`
    /// policy.
    pub fn classify(&self, name: &str) -> OperationDescriptor {
        match self.descriptors.get(name) {
            Some(descriptor) => descriptor.clone(),
            None => {
                if self.reported_unknown.insert(name.to_string()) {
                    info!(operation = %name, "Refusing unknown operation");
                } else {
                    debug!(operation = %name, "Refusing unknown operation");
                }
                OperationDescriptor::unrecognized(name, ResultShape::StatusCode)
            }
        }
    }

    pub fn report(&self) -> &ClassifierReport {
        &self.report
    }

    /// Surface an engine build is expected to expose for full classification
    pub fn expected_surface() -> Vec<OperationSignature> {
        OPERATION_TABLE
            .iter()
            .map(|entry| OperationSignature::new(entry.name, entry.result))
            .collect()
    }
}

fn validate_table() -> Result<()> {
    for entry in OPERATION_TABLE {
        if entry.policy == OperationPolicy::Retryable && entry.result != ResultShape::StatusCode {
            return Err(GatewayError::Classification(format!(
                "operation '{}' is classified retryable but has a {:?} result",
                entry.name, entry.result
            )));
        }
    }
    Ok(())
}
