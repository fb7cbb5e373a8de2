//! Append-only audit trail of blocked and downgraded actions.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::core::now_rfc3339;
use crate::policy::action::ActionType;
use crate::state::canonical::CanonicalState;
use crate::state::contract::ValidationCode;

/// Why the bridge returned a NOOP instead of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    ContractViolation,
    ConversionFailure,
    InternalFailure,
}

/// A payload that never reached the policy, or a pass that failed internally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedAction {
    pub timestamp: String,
    pub kind: BlockKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_code: Option<ValidationCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl BlockedAction {
    #[must_use]
    pub fn new(kind: BlockKind, reason: impl Into<String>) -> Self {
        Self {
            timestamp: now_rfc3339(),
            kind,
            reason: reason.into(),
            validation_code: None,
            payload: None,
            exception: None,
        }
    }

    #[must_use]
    pub fn with_validation_code(mut self, code: ValidationCode) -> Self {
        self.validation_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

/// A proposed action replaced by `NOOP` because the environment forbids it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeDowngrade {
    pub timestamp: String,
    pub original_action: ActionType,
    pub safe_action: ActionType,
    pub env: String,
    pub reason: String,
    pub state: CanonicalState,
}

impl SafeDowngrade {
    #[must_use]
    pub fn new(
        original_action: ActionType,
        safe_action: ActionType,
        state: &CanonicalState,
    ) -> Self {
        let env = state.env().to_string();
        Self {
            timestamp: now_rfc3339(),
            reason: format!("Action {original_action} not allowed in {env}"),
            original_action,
            safe_action,
            env,
            state: state.clone(),
        }
    }
}

/// Two independently locked append-only logs.
#[derive(Debug, Default)]
pub struct AuditLog {
    blocked: Mutex<Vec<BlockedAction>>,
    downgrades: Mutex<Vec<SafeDowngrade>>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_blocked(&self, entry: BlockedAction) {
        self.blocked.lock().push(entry);
    }

    pub fn record_downgrade(&self, entry: SafeDowngrade) {
        self.downgrades.lock().push(entry);
    }

    /// Copy of every blocked entry, oldest first.
    #[must_use]
    pub fn blocked_actions(&self) -> Vec<BlockedAction> {
        self.blocked.lock().clone()
    }

    /// Copy of every downgrade entry, oldest first.
    #[must_use]
    pub fn safe_downgrades(&self) -> Vec<SafeDowngrade> {
        self.downgrades.lock().clone()
    }

    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.lock().len()
    }

    #[must_use]
    pub fn downgrade_count(&self) -> usize {
        self.downgrades.lock().len()
    }
}
