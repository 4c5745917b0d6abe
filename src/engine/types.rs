//! Value types exchanged with the engine.

use crate::constants::error_codes::STATUS_OK;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Engine;

/// Opaque, comparable configuration generation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigGeneration(pub i64);

impl std::fmt::Display for ConfigGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error code and message reported by a native call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// How an operation reports its result natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// Integer status code plus out-parameter buffer
    StatusCode,
    /// Value-carrying return that cannot signal failure through a status
    Value,
}

/// Kind of specialised engine instance able to serve an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCapability {
    /// Record mutation and redo processing
    Resolver,
    /// Why/how explanations
    Auditor,
    /// Lookup, search, path, network and export
    Query,
}

impl EngineCapability {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCapability::Resolver => "resolver",
            EngineCapability::Auditor => "auditor",
            EngineCapability::Query => "query",
        }
    }
}

/// Kind of a positional operation argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    Text,
    Integer,
    Flags,
    Json,
}

impl ArgKind {
    /// Whether a JSON value is acceptable for this argument kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgKind::Text => value.is_string(),
            ArgKind::Integer | ArgKind::Flags => value.is_i64() || value.is_u64(),
            ArgKind::Json => value.is_object() || value.is_array() || value.is_string(),
        }
    }
}

/// Named positional argument of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl ArgSpec {
    pub const fn new(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind }
    }
}

/// Signature of an operation as exposed by a concrete engine build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationSignature {
    pub name: String,
    pub result: ResultShape,
}

impl OperationSignature {
    pub fn new(name: impl Into<String>, result: ResultShape) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }
}

/// Everything observed from one native invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeOutcome {
    pub status: i32,
    pub error_code: i64,
    pub error_message: String,
    pub payload: String,
}

impl NativeOutcome {
    /// Invoke an operation on a handle and capture status, error and payload
    pub fn capture(engine: &mut dyn Engine, operation: &str, args: &[Value]) -> Self {
        engine.clear_last_error();
        let mut payload = String::new();
        let status = engine.invoke(operation, args, &mut payload);

        if status == STATUS_OK {
            Self {
                status,
                error_code: 0,
                error_message: String::new(),
                payload,
            }
        } else {
            Self {
                status,
                error_code: engine.last_error_code(),
                error_message: engine.last_error_message(),
                payload,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn native_error(&self) -> NativeError {
        NativeError {
            code: self.error_code,
            message: self.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arg_kind_acceptance() {
        assert!(ArgKind::Text.accepts(&json!("TEST")));
        assert!(!ArgKind::Text.accepts(&json!(12)));
        assert!(ArgKind::Flags.accepts(&json!(0)));
        assert!(!ArgKind::Integer.accepts(&json!("12")));
        assert!(ArgKind::Json.accepts(&json!({"NAME_FULL": "Joe Schmoe"})));
        assert!(!ArgKind::Json.accepts(&json!(null)));
    }

    #[test]
    fn test_generation_ordering() {
        assert!(ConfigGeneration(2) > ConfigGeneration(1));
        assert_eq!(ConfigGeneration(7).to_string(), "7");
    }
}
