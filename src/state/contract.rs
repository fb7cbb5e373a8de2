//! Runtime contract validation: the gate every payload passes before any
//! decision is attempted.
//!
//! Rules are checked in a fixed order and the first failing rule wins; errors
//! are never accumulated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::decision::Decision;
use crate::state::canonical::{Environment, HealthBand};
use crate::state::telemetry::{FIELD_APP, FIELD_ENV, FIELD_STATE, RuntimeTelemetry};

/// Fields that must be present in every payload, in reporting order.
pub const REQUIRED_FIELDS: [&str; 3] = [FIELD_APP, FIELD_ENV, FIELD_STATE];

/// Result code of a contract check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// Payload satisfies the contract.
    Valid,
    /// `app` is not a string or is blank.
    InvalidApp,
    /// `env` is not one of the known environments.
    InvalidEnv,
    /// `state` is not one of the known health literals.
    UnknownState,
    /// Payload is not a mapping or lacks required fields.
    IncompleteData,
}

impl ValidationCode {
    /// Stable snake_case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::InvalidApp => "invalid_app",
            Self::InvalidEnv => "invalid_env",
            Self::UnknownState => "unknown_state",
            Self::IncompleteData => "incomplete_data",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(valid, code, message)` triple produced by [`ContractValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the payload may proceed.
    pub valid: bool,
    /// Machine-readable result code.
    pub code: ValidationCode,
    /// Human-readable explanation (`"Valid state"` on success).
    pub message: String,
}

impl ValidationOutcome {
    fn pass() -> Self {
        Self {
            valid: true,
            code: ValidationCode::Valid,
            message: "Valid state".to_string(),
        }
    }

    fn fail(code: ValidationCode, message: String) -> Self {
        Self {
            valid: false,
            code,
            message,
        }
    }
}

/// Stateless contract checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractValidator;

impl ContractValidator {
    /// Create a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Check `payload` against the runtime contract.
    ///
    /// Pure: calling it twice on the same payload yields the same outcome.
    #[must_use]
    pub fn validate(&self, payload: &RuntimeTelemetry) -> ValidationOutcome {
        let Some(obj) = payload.as_object() else {
            return ValidationOutcome::fail(
                ValidationCode::IncompleteData,
                format!(
                    "Payload must be a mapping, got {}",
                    json_kind(payload.as_value())
                ),
            );
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !obj.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return ValidationOutcome::fail(
                ValidationCode::IncompleteData,
                format!("Missing required fields: [{}]", missing.join(", ")),
            );
        }

        match obj.get(FIELD_APP).and_then(Value::as_str) {
            None => {
                return ValidationOutcome::fail(
                    ValidationCode::InvalidApp,
                    "App name must be a string".to_string(),
                );
            }
            Some(app) if app.trim().is_empty() => {
                return ValidationOutcome::fail(
                    ValidationCode::InvalidApp,
                    "App name cannot be empty".to_string(),
                );
            }
            Some(_) => {}
        }

        let env = obj.get(FIELD_ENV);
        if env
            .and_then(Value::as_str)
            .and_then(Environment::from_literal)
            .is_none()
        {
            return ValidationOutcome::fail(
                ValidationCode::InvalidEnv,
                format!(
                    "Invalid env {}. Must be one of: [{}]",
                    describe(env),
                    Environment::ALL.map(Environment::as_str).join(", ")
                ),
            );
        }

        let state = obj.get(FIELD_STATE);
        if state
            .and_then(Value::as_str)
            .and_then(HealthBand::from_literal)
            .is_none()
        {
            return ValidationOutcome::fail(
                ValidationCode::UnknownState,
                format!(
                    "Invalid state {}. Must be one of: [{}]",
                    describe(state),
                    HealthBand::ALL.map(HealthBand::as_str).join(", ")
                ),
            );
        }

        ValidationOutcome::pass()
    }

    /// The safe NOOP response a caller must return for a rejected payload.
    #[must_use]
    pub fn noop_response(&self, reason: impl Into<String>) -> Decision {
        Decision::noop(reason)
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => format!("'{s}'"),
        Some(other) => other.to_string(),
        None => "<absent>".to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
