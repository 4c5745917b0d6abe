//! Parsing of raw bulk input lines into loadable records.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::record_fields::{DATA_SOURCE, RECORD_ID};

/// A record ready to be handed to `add_record`
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRecord {
    pub data_source: String,
    pub record_id: String,
    pub definition: Value,
}

/// Why a record was counted incomplete instead of being loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum IncompleteReason {
    InvalidJson(String),
    NotAnObject,
    MissingDataSource,
    MissingRecordId,
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncompleteReason::InvalidJson(e) => write!(f, "record is not valid JSON: {e}"),
            IncompleteReason::NotAnObject => write!(f, "record is not a JSON object"),
            IncompleteReason::MissingDataSource => write!(f, "record has no {DATA_SOURCE}"),
            IncompleteReason::MissingRecordId => write!(f, "record has no {RECORD_ID}"),
        }
    }
}

/// Parse one raw JSON record line
pub fn parse_record(
    raw: &str,
    default_data_source: Option<&str>,
) -> Result<BulkRecord, IncompleteReason> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| IncompleteReason::InvalidJson(e.to_string()))?;
    record_from_value(value, default_data_source)
}

/// Validate an already parsed record
pub fn record_from_value(
    value: Value,
    default_data_source: Option<&str>,
) -> Result<BulkRecord, IncompleteReason> {
    let Value::Object(mut object) = value else {
        return Err(IncompleteReason::NotAnObject);
    };

    let data_source = match identifier(&object, DATA_SOURCE) {
        Some(ds) => ds,
        None => match default_data_source {
            Some(ds) if !ds.trim().is_empty() => {
                object.insert(DATA_SOURCE.to_string(), Value::String(ds.to_string()));
                ds.to_string()
            }
            _ => return Err(IncompleteReason::MissingDataSource),
        },
    };
    let record_id = identifier(&object, RECORD_ID).ok_or(IncompleteReason::MissingRecordId)?;

    Ok(BulkRecord {
        data_source,
        record_id,
        definition: Value::Object(object),
    })
}

/// Non-blank string or integer identifier field
fn identifier(object: &Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}
