//! # Native Error Classification
//!
//! Maps the integer error codes reported by the engine onto the small set of
//! error classes that drive retry and refresh decisions.
//!
//! ## Classes
//!
//! | Class               | Retry policy                               | Client mapping |
//! |---------------------|--------------------------------------------|----------------|
//! | `ReconnectRequired` | always retried once after a forced check   | 503            |
//! | `ConfigStale`       | retried once if the config was refreshed   | 503            |
//! | `NotFound`          | never                                      | 404            |
//! | `Validation`        | never                                      | 400            |
//! | `Unsupported`       | never                                      | 501            |
//! | `Fatal`             | never, logged with the native diagnostic   | 500            |

use crate::constants::error_codes;
use serde::{Deserialize, Serialize};

/// Error classes derived from native engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient infrastructure fault, the connection must be re-established
    ReconnectRequired,
    /// The engine is running with an outdated configuration generation
    ConfigStale,
    /// The requested record or entity does not exist
    NotFound,
    /// The caller supplied malformed input
    Validation,
    /// The operation is not routed by this layer
    Unsupported,
    /// Anything else
    Fatal,
}

impl ErrorClass {
    /// HTTP status the façade should use when this class reaches a client
    pub fn http_status_hint(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::Validation => 400,
            ErrorClass::Unsupported => 501,
            ErrorClass::ReconnectRequired | ErrorClass::ConfigStale => 503,
            ErrorClass::Fatal => 500,
        }
    }

    /// Whether this class is a transient infrastructure fault
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::ReconnectRequired | ErrorClass::ConfigStale)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::ReconnectRequired => write!(f, "Reconnect Required"),
            ErrorClass::ConfigStale => write!(f, "Config Stale"),
            ErrorClass::NotFound => write!(f, "Not Found"),
            ErrorClass::Validation => write!(f, "Validation"),
            ErrorClass::Unsupported => write!(f, "Unsupported"),
            ErrorClass::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Fixed lookup from native error code to error class
const CLASSIFICATION_TABLE: &[(i64, ErrorClass)] = &[
    (error_codes::DATABASE_CONNECTION_LOST, ErrorClass::ReconnectRequired),
    (error_codes::DATABASE_CONNECTION_FAILURE, ErrorClass::ReconnectRequired),
    (error_codes::STATEMENT_ON_INVALID_CONNECTION, ErrorClass::ReconnectRequired),
    (error_codes::CONFIGURATION_NOT_CURRENT, ErrorClass::ConfigStale),
    (error_codes::CONFIGURATION_MISMATCH, ErrorClass::ConfigStale),
    (error_codes::UNKNOWN_RECORD, ErrorClass::NotFound),
    (error_codes::UNKNOWN_RESOLVED_ENTITY, ErrorClass::NotFound),
    (error_codes::INVALID_JSON, ErrorClass::Validation),
    (error_codes::MISSING_REQUIRED_FIELD, ErrorClass::Validation),
    (error_codes::UNKNOWN_DATA_SOURCE, ErrorClass::Validation),
    (error_codes::INVALID_FLAGS, ErrorClass::Validation),
    (error_codes::UNSUPPORTED_OPERATION, ErrorClass::Unsupported),
];

/// Classify a native error code
pub fn classify_native_code(code: i64) -> ErrorClass {
    CLASSIFICATION_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, class)| *class)
        .unwrap_or(ErrorClass::Fatal)
}
