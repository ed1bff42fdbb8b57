//! Typed view of the reference workload carried inside `input`/`output`.
//!
//! The relay and the router treat payloads as opaque strings. These types are
//! only used where the client itself has to author a payload, namely the
//! error result a worker returns when its processor fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `function` reported when the failing input did not name one.
pub const UNKNOWN_FUNCTION: &str = "unknown";

/// Result code for a failed call.
pub const RESULT_FAILED: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadResult {
    #[serde(default)]
    pub sequence_num: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// 0 on success, non-zero on failure.
    pub result: i64,
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i64>,
    /// Present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output_parameters: Value,
}

impl WorkloadResult {
    #[must_use]
    pub fn failure(sequence_num: i64, function: &str, message: &str) -> Self {
        Self {
            sequence_num,
            function: Some(function.to_owned()),
            result: RESULT_FAILED,
            return_code: Some(RESULT_FAILED),
            error: Some(message.to_owned()),
            output_parameters: serde_json::json!({ "error": message }),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build the failure payload for `input`, keeping its `sequence_num` and
/// `function` when they can be read, so the requester can tell which call
/// failed even if the rest of the input was unusable.
#[must_use]
pub fn error_payload(input: &str, message: &str) -> String {
    let parsed = serde_json::from_str::<Value>(input).ok();
    let sequence_num = parsed
        .as_ref()
        .and_then(|v| v.get("sequence_num"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let function = parsed
        .as_ref()
        .and_then(|v| v.get("function"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_FUNCTION);

    WorkloadResult::failure(sequence_num, function, message).to_json()
}

#[cfg(test)]
#[path = "workload_test.rs"]
mod tests;
