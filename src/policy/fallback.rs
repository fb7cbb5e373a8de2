//! Deterministic rule-based action selection.
//!
//! Used whenever the learned policy cannot give a trustworthy answer. Total
//! over every canonical state; never panics.

use crate::policy::action::ActionType;
use crate::state::canonical::{CanonicalState, HealthBand};

/// Failure count above which a restart is forced regardless of band.
pub const RESTART_FAILURES_ABOVE: u64 = 10;
/// Failure count above which capacity is added regardless of band.
pub const SCALE_UP_FAILURES_ABOVE: u64 = 3;

/// Heuristic action for `state`.
#[must_use]
pub fn rule_based_action(state: &CanonicalState) -> ActionType {
    let band = state.health_band();
    let failures = state.recent_failures();

    if band == HealthBand::Failing || failures > RESTART_FAILURES_ABOVE {
        ActionType::Restart
    } else if band == HealthBand::Degraded || failures > SCALE_UP_FAILURES_ABOVE {
        ActionType::ScaleUp
    } else if band == HealthBand::Healthy && failures == 0 {
        ActionType::ScaleDown
    } else {
        ActionType::Noop
    }
}
