//! Per-environment allow-lists for proposed actions.
//!
//! The guard is stateless: the verdict depends only on the action and the
//! environment label. Unknown labels get the most restrictive envelope, so a
//! typo in `env` can never widen what is allowed.

use crate::policy::action::ActionType;
use crate::state::canonical::Environment;

const PROD_ALLOWED: &[ActionType] = &[ActionType::Noop, ActionType::ScaleUp];
const STAGE_ALLOWED: &[ActionType] = &[
    ActionType::Noop,
    ActionType::ScaleUp,
    ActionType::ScaleDown,
];
const UNKNOWN_ALLOWED: &[ActionType] = &[ActionType::Noop];

/// Outcome of [`SafetyGuard::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardVerdict {
    /// Action that may be executed.
    pub action: ActionType,
    /// The proposed action was replaced with `NOOP`.
    pub downgraded: bool,
}

/// Environment-scoped safety envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyGuard;

impl SafetyGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Actions permitted in `env`. Matching is exact.
    #[must_use]
    pub fn allowed_actions(&self, env: &str) -> &'static [ActionType] {
        match Environment::from_literal(env) {
            Some(Environment::Prod) => PROD_ALLOWED,
            Some(Environment::Stage) => STAGE_ALLOWED,
            Some(Environment::Dev) => &ActionType::ALL,
            None => UNKNOWN_ALLOWED,
        }
    }

    #[must_use]
    pub fn is_allowed(&self, action: ActionType, env: &str) -> bool {
        self.allowed_actions(env).contains(&action)
    }

    /// Pass `action` through, or downgrade it to `NOOP` when `env` does not
    /// allow it.
    #[must_use]
    pub fn apply(&self, action: ActionType, env: &str) -> GuardVerdict {
        if self.is_allowed(action, env) {
            GuardVerdict {
                action,
                downgraded: false,
            }
        } else {
            GuardVerdict {
                action: ActionType::Noop,
                downgraded: true,
            }
        }
    }
}
