//! Decision records returned to the orchestrator.
//!
//! The wire form is a flat, untagged JSON object with exactly one of two
//! shapes: an approved action or a NOOP fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::now_rfc3339;
use crate::policy::action::ActionType;
use crate::state::canonical::{CanonicalState, Environment};

/// State fields whose presence makes up decision confidence.
pub const CONFIDENCE_FIELDS: [&str; 3] = ["health_band", "latency_bucket", "recent_failures"];

/// Fraction of [`CONFIDENCE_FIELDS`] carried by `state`, in `[0, 1]`.
#[must_use]
pub fn confidence_for(state: &CanonicalState) -> f64 {
    serde_json::to_value(state).map_or(0.0, |wire| completeness(&wire))
}

/// Fraction of [`CONFIDENCE_FIELDS`] present and non-null in `record`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn completeness(record: &Value) -> f64 {
    let present = CONFIDENCE_FIELDS
        .iter()
        .filter(|field| record.get(**field).is_some_and(|v| !v.is_null()))
        .count();
    present as f64 / CONFIDENCE_FIELDS.len() as f64
}

/// Outcome of one pass through the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Approved(ApprovedDecision),
    Fallback(NoopFallback),
}

/// An action cleared by the safety guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedDecision {
    pub action: ActionType,
    pub app_id: String,
    pub env: Environment,
    /// Input completeness in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable explanation.
    pub reasoning: String,
    /// Always `true`.
    pub safe_for_execution: bool,
    pub timestamp: String,
}

/// The safe NOOP returned whenever the pipeline cannot produce a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoopFallback {
    /// Always `NOOP`.
    pub action: ActionType,
    pub reason: String,
    /// Always `true`.
    pub safe_fallback: bool,
    pub timestamp: String,
}

impl Decision {
    /// NOOP fallback stamped with the current time.
    #[must_use]
    pub fn noop(reason: impl Into<String>) -> Self {
        Self::Fallback(NoopFallback {
            action: ActionType::Noop,
            reason: reason.into(),
            safe_fallback: true,
            timestamp: now_rfc3339(),
        })
    }

    /// Approved decision for `action` in `state`.
    ///
    /// `blocked` is the originally proposed action when the guard replaced it.
    #[must_use]
    pub fn approved(
        action: ActionType,
        state: &CanonicalState,
        blocked: Option<ActionType>,
    ) -> Self {
        let mut reasoning = reasoning_for(action, state);
        if let Some(original) = blocked {
            reasoning.push_str(&format!(
                " ({original} not allowed in {}, downgraded)",
                state.env()
            ));
        }
        Self::Approved(ApprovedDecision {
            action,
            app_id: state.app_id().to_string(),
            env: state.env(),
            confidence: confidence_for(state),
            reasoning,
            safe_for_execution: true,
            timestamp: now_rfc3339(),
        })
    }

    #[must_use]
    pub const fn action(&self) -> ActionType {
        match self {
            Self::Approved(d) => d.action,
            Self::Fallback(f) => f.action,
        }
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Approved(d) => &d.timestamp,
            Self::Fallback(f) => &f.timestamp,
        }
    }

    #[must_use]
    pub const fn as_approved(&self) -> Option<&ApprovedDecision> {
        match self {
            Self::Approved(d) => Some(d),
            Self::Fallback(_) => None,
        }
    }

    /// Reason of a fallback decision.
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Approved(_) => None,
            Self::Fallback(f) => Some(&f.reason),
        }
    }
}

/// One-sentence explanation of `action` for `state`.
#[must_use]
pub fn reasoning_for(action: ActionType, state: &CanonicalState) -> String {
    let health = state.health_band();
    let failures = state.recent_failures();
    match action {
        ActionType::Noop => format!("No action needed - health: {health}, failures: {failures}"),
        ActionType::ScaleUp => {
            format!("Scale up to absorb load - health: {health}, failures: {failures}")
        }
        ActionType::ScaleDown => {
            format!("Scale down opportunity - health: {health}, failures: {failures}")
        }
        ActionType::Restart => {
            format!("Restart required - critical health: {health}, failures: {failures}")
        }
        ActionType::Rollback => {
            format!("Roll back to last stable release - health: {health}, failures: {failures}")
        }
    }
}
