//! Reward model for state/action pairs.
//!
//! Every magnitude is a configurable weight; defaults reproduce the
//! historical tuning (`successful_action = 5`, `failed_action = -20`, …).

use serde::{Deserialize, Serialize};

use crate::policy::action::ActionType;
use crate::state::canonical::{CanonicalState, HealthBand};

/// States with more failures than this incur `high_failure_penalty`.
pub const HIGH_FAILURE_THRESHOLD: u64 = 10;

/// Reward-shaping weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    /// Healthy service left alone.
    pub no_change_needed: f64,
    /// Action that fits the health band.
    pub successful_action: f64,
    /// Restart of a merely degraded service.
    pub partial_credit: f64,
    /// Restart of a failing service.
    pub critical_action: f64,
    /// Action that does not fit the health band.
    pub failed_action: f64,
    /// Added when the state has more than 10 recent failures.
    pub high_failure_penalty: f64,
    /// Added when the next state shows fewer failures.
    pub error_reduction: f64,
    /// Added for every non-NOOP action.
    pub time_penalty: f64,
    /// Added by feedback that reports an unsuccessful execution.
    pub feedback_failure_penalty: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            no_change_needed: 2.0,
            successful_action: 5.0,
            partial_credit: 2.5,
            critical_action: 10.0,
            failed_action: -20.0,
            high_failure_penalty: -2.0,
            error_reduction: 15.0,
            time_penalty: -1.0,
            feedback_failure_penalty: -20.0,
        }
    }
}

impl RewardWeights {
    /// `(name, value)` pairs, used for validation and logging.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, f64); 9] {
        [
            ("no_change_needed", self.no_change_needed),
            ("successful_action", self.successful_action),
            ("partial_credit", self.partial_credit),
            ("critical_action", self.critical_action),
            ("failed_action", self.failed_action),
            ("high_failure_penalty", self.high_failure_penalty),
            ("error_reduction", self.error_reduction),
            ("time_penalty", self.time_penalty),
            ("feedback_failure_penalty", self.feedback_failure_penalty),
        ]
    }

    /// Reward for taking `action` in `state`, optionally observing `next`.
    #[must_use]
    pub fn reward(
        &self,
        state: &CanonicalState,
        action: ActionType,
        next: Option<&CanonicalState>,
    ) -> f64 {
        let mut reward = self.base(state.health_band(), action);

        if state.recent_failures() > HIGH_FAILURE_THRESHOLD {
            reward += self.high_failure_penalty;
        }

        if next.is_some_and(|n| n.recent_failures() < state.recent_failures()) {
            reward += self.error_reduction;
        }

        if action.is_mutating() {
            reward += self.time_penalty;
        }

        reward
    }

    fn base(&self, band: HealthBand, action: ActionType) -> f64 {
        match (band, action) {
            (HealthBand::Healthy, ActionType::Noop) => self.no_change_needed,
            (HealthBand::Healthy, ActionType::ScaleDown) => self.successful_action,
            (
                HealthBand::Healthy,
                ActionType::ScaleUp | ActionType::Restart | ActionType::Rollback,
            ) => self.failed_action,

            (HealthBand::Degraded, ActionType::ScaleUp | ActionType::Noop) => {
                self.successful_action
            }
            (HealthBand::Degraded, ActionType::Restart) => self.partial_credit,
            (HealthBand::Degraded, ActionType::ScaleDown | ActionType::Rollback) => {
                self.failed_action
            }

            (HealthBand::Failing, ActionType::Restart) => self.critical_action,
            (HealthBand::Failing, ActionType::ScaleUp) => self.successful_action,
            (
                HealthBand::Failing,
                ActionType::Noop | ActionType::ScaleDown | ActionType::Rollback,
            ) => self.failed_action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::canonical::{Environment, LatencyBucket};

    fn state(band: HealthBand, failures: u64) -> CanonicalState {
        CanonicalState::from_parts(
            "svc".to_string(),
            Environment::Dev,
            band,
            LatencyBucket::Low,
            failures,
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn healthy_rewards() {
        let w = RewardWeights::default();
        let s = state(HealthBand::Healthy, 0);
        assert!(approx(w.reward(&s, ActionType::Noop, None), 2.0));
        assert!(approx(w.reward(&s, ActionType::ScaleDown, None), 4.0));
        assert!(approx(w.reward(&s, ActionType::Restart, None), -21.0));
    }

    #[test]
    fn degraded_rewards() {
        let w = RewardWeights::default();
        let s = state(HealthBand::Degraded, 3);
        assert!(approx(w.reward(&s, ActionType::Noop, None), 5.0));
        assert!(approx(w.reward(&s, ActionType::ScaleUp, None), 4.0));
        assert!(approx(w.reward(&s, ActionType::Restart, None), 1.5));
        assert!(approx(w.reward(&s, ActionType::Rollback, None), -21.0));
    }

    #[test]
    fn failing_rewards_include_high_failure_penalty() {
        let w = RewardWeights::default();
        let s = state(HealthBand::Failing, 25);
        // critical 10 - high failures 2 - time 1
        assert!(approx(w.reward(&s, ActionType::Restart, None), 7.0));
        assert!(approx(w.reward(&s, ActionType::Noop, None), -22.0));
        let mild = state(HealthBand::Failing, 10);
        assert!(approx(w.reward(&mild, ActionType::Restart, None), 9.0));
    }

    #[test]
    fn error_reduction_bonus_needs_fewer_failures() {
        let w = RewardWeights::default();
        let s = state(HealthBand::Failing, 25);
        let better = state(HealthBand::Degraded, 4);
        let same = state(HealthBand::Failing, 25);
        assert!(approx(w.reward(&s, ActionType::Restart, Some(&better)), 22.0));
        assert!(approx(w.reward(&s, ActionType::Restart, Some(&same)), 7.0));
    }

    #[test]
    fn weights_are_overridable() {
        let w = RewardWeights {
            no_change_needed: 100.0,
            time_penalty: 0.0,
            ..RewardWeights::default()
        };
        let s = state(HealthBand::Healthy, 0);
        assert!(approx(w.reward(&s, ActionType::Noop, None), 100.0));
        assert!(approx(w.reward(&s, ActionType::ScaleDown, None), 5.0));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let w: RewardWeights = toml::from_str("failed_action = -5.0").unwrap();
        assert!(approx(w.failed_action, -5.0));
        assert!(approx(w.successful_action, 5.0));
    }
}
