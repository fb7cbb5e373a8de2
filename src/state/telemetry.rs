//! Raw runtime telemetry as received from producers.
//!
//! Telemetry is deliberately untyped: producers may send anything, including
//! non-objects, wrong field types, or missing fields. Typed interpretation
//! happens in the contract validator and the state adapter.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the application identifier.
pub const FIELD_APP: &str = "app";
/// Field carrying the deployment environment.
pub const FIELD_ENV: &str = "env";
/// Field carrying the reported health state.
pub const FIELD_STATE: &str = "state";
/// Field carrying observed latency in milliseconds.
pub const FIELD_LATENCY_MS: &str = "latency_ms";
/// Field carrying the error count of the last minute.
pub const FIELD_ERRORS_LAST_MIN: &str = "errors_last_min";

/// An arbitrary telemetry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeTelemetry(Value);

impl RuntimeTelemetry {
    /// Wrap an already-parsed JSON value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a JSON document. Any syntactically valid JSON is accepted,
    /// including non-objects; those are rejected later by the validator.
    pub fn from_json_str(raw: &str) -> crate::core::errors::Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    /// Underlying JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The payload as a mapping, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    /// Raw field lookup; `None` when absent or when the payload is not a mapping.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(name))
    }

    /// Field lookup that only yields string values.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Whether the payload is a mapping containing `name` (with any value).
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.as_object().is_some_and(|obj| obj.contains_key(name))
    }
}

impl From<Value> for RuntimeTelemetry {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for RuntimeTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_access_on_mapping() {
        let t = RuntimeTelemetry::new(json!({"app": "api", "latency_ms": 120, "env": null}));
        assert_eq!(t.str_field(FIELD_APP), Some("api"));
        assert_eq!(t.str_field(FIELD_LATENCY_MS), None);
        assert!(t.has_field(FIELD_ENV));
        assert!(!t.has_field(FIELD_STATE));
    }

    #[test]
    fn non_mapping_has_no_fields() {
        let t = RuntimeTelemetry::new(json!("not a dict"));
        assert!(t.as_object().is_none());
        assert!(!t.has_field(FIELD_APP));
        assert!(t.field(FIELD_APP).is_none());
    }

    #[test]
    fn parses_any_json_document() {
        assert!(RuntimeTelemetry::from_json_str("null").is_ok());
        assert!(RuntimeTelemetry::from_json_str("[1,2]").is_ok());
        let err = RuntimeTelemetry::from_json_str("{broken").expect_err("invalid json");
        assert_eq!(err.code(), "SDB-2101");
    }
}
