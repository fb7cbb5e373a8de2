//! The decision bridge: validate, convert, choose, guard, decide.
//!
//! [`DecisionBridge::process_runtime_state`] always returns a [`Decision`].
//! Every rejection path produces the NOOP fallback plus an audit entry, and a
//! panic anywhere in the pipeline is caught and treated the same way.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::bridge::audit::{AuditLog, BlockKind, BlockedAction, SafeDowngrade};
use crate::bridge::decision::{Decision, confidence_for};
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::guard::safety::SafetyGuard;
use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent};
use crate::policy::action::ActionType;
use crate::policy::agent::{ActionPolicy, PolicyChoice, PolicySummary, QLearningPolicy};
use crate::policy::table::ActionValues;
use crate::state::adapter::StateAdapter;
use crate::state::canonical::CanonicalState;
use crate::state::contract::ContractValidator;
use crate::state::telemetry::RuntimeTelemetry;

/// Reason recorded when the adapter cannot build a canonical state.
pub const CONVERSION_FAILURE_REASON: &str = "Failed to convert runtime state to canonical form";

// ──────────────────── stats ────────────────────

#[derive(Debug, Default)]
struct StatsCounters {
    decisions: AtomicU64,
    fallbacks: AtomicU64,
    downgrades: AtomicU64,
    policy_fallbacks: AtomicU64,
    feedback_applied: AtomicU64,
    feedback_rejected: AtomicU64,
}

/// Point-in-time bridge counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BridgeStats {
    /// Calls to `process_runtime_state`.
    pub decisions: u64,
    /// Calls that ended in the NOOP fallback.
    pub fallbacks: u64,
    /// Approved decisions the guard downgraded.
    pub downgrades: u64,
    /// Decisions taken from the rule-based fallback.
    pub policy_fallbacks: u64,
    pub feedback_applied: u64,
    pub feedback_rejected: u64,
}

/// Result of [`DecisionBridge::provide_feedback`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// The policy learned from the experience.
    Applied { reward: f64, new_value: f64 },
    /// Nothing was learned.
    Rejected { reason: String },
}

// ──────────────────── bridge ────────────────────

/// Owned decision service. Share across threads with `Arc<DecisionBridge>`.
pub struct DecisionBridge {
    validator: ContractValidator,
    adapter: StateAdapter,
    policy: Arc<dyn ActionPolicy>,
    guard: SafetyGuard,
    audit: AuditLog,
    stats: StatsCounters,
    logger: Option<ActivityLoggerHandle>,
}

impl DecisionBridge {
    /// Bridge around `policy` with default adapter thresholds.
    #[must_use]
    pub fn new(policy: Arc<dyn ActionPolicy>) -> Self {
        Self {
            validator: ContractValidator::new(),
            adapter: StateAdapter::default(),
            policy,
            guard: SafetyGuard::new(),
            audit: AuditLog::new(),
            stats: StatsCounters::default(),
            logger: None,
        }
    }

    /// Bridge with a fresh in-memory policy built from `config`. No threads
    /// are started; use [`crate::bridge::runtime::BridgeRuntime`] for
    /// logging and persistence.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let policy = QLearningPolicy::from_config(config)?;
        Ok(Self::new(Arc::new(policy)).with_adapter(StateAdapter::new(config.adapter.clone())))
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: StateAdapter) -> Self {
        self.adapter = match &self.logger {
            Some(logger) => adapter.with_logger(logger.clone()),
            None => adapter,
        };
        self
    }

    /// Route bridge and adapter events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.adapter = self.adapter.with_logger(logger.clone());
        self.logger = Some(logger);
        self
    }

    /// Shared handle to the policy.
    #[must_use]
    pub fn policy(&self) -> &Arc<dyn ActionPolicy> {
        &self.policy
    }

    // ──────────────────── decisions ────────────────────

    /// Turn raw telemetry into a decision. Never panics, never fails.
    pub fn process_runtime_state(&self, payload: &RuntimeTelemetry) -> Decision {
        self.stats.decisions.fetch_add(1, Ordering::Relaxed);

        let decision = match catch_unwind(AssertUnwindSafe(|| self.run_pipeline(payload))) {
            Ok(decision) => decision,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                let reason = format!("Bridge processing failed: {detail}");
                self.audit.record_blocked(
                    BlockedAction::new(BlockKind::InternalFailure, reason.clone())
                        .with_payload(payload.as_value().clone())
                        .with_exception(detail),
                );
                self.log(BridgeEvent::ActionBlocked {
                    reason: reason.clone(),
                    details: None,
                });
                Decision::noop(reason)
            }
        };

        if decision.is_fallback() {
            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }

    fn run_pipeline(&self, payload: &RuntimeTelemetry) -> Decision {
        let outcome = self.validator.validate(payload);
        if !outcome.valid {
            self.audit.record_blocked(
                BlockedAction::new(
                    BlockKind::ContractViolation,
                    format!("Contract validation failed: {}", outcome.message),
                )
                .with_validation_code(outcome.code)
                .with_payload(payload.as_value().clone()),
            );
            self.log(BridgeEvent::ContractRejected {
                code: outcome.code.to_string(),
                message: outcome.message.clone(),
                payload: payload.to_string(),
            });
            return self.validator.noop_response(outcome.message);
        }

        let Some(state) = self.adapter.convert(payload) else {
            self.audit.record_blocked(
                BlockedAction::new(BlockKind::ConversionFailure, CONVERSION_FAILURE_REASON)
                    .with_payload(payload.as_value().clone()),
            );
            self.log(BridgeEvent::ActionBlocked {
                reason: CONVERSION_FAILURE_REASON.to_string(),
                details: Some(payload.to_string()),
            });
            return self.validator.noop_response(CONVERSION_FAILURE_REASON);
        };

        let proposed = self.propose(&state);

        let verdict = self.guard.apply(proposed, state.env().as_str());
        if verdict.downgraded {
            self.stats.downgrades.fetch_add(1, Ordering::Relaxed);
            self.audit
                .record_downgrade(SafeDowngrade::new(proposed, verdict.action, &state));
            self.log(BridgeEvent::SafetyDowngrade {
                app_id: state.app_id().to_string(),
                env: state.env().to_string(),
                original_action: proposed.to_string(),
                safe_action: verdict.action.to_string(),
            });
        }

        self.log(BridgeEvent::DecisionIssued {
            app_id: state.app_id().to_string(),
            env: state.env().to_string(),
            action: verdict.action.to_string(),
            confidence: confidence_for(&state),
        });
        Decision::approved(verdict.action, &state, verdict.downgraded.then_some(proposed))
    }

    /// Learned action, or the rule-based one when the policy degrades.
    fn propose(&self, state: &CanonicalState) -> ActionType {
        let state_key = state.key().to_string();
        match self.policy.choose_action(state) {
            PolicyChoice::Exploit { action, value } => {
                self.log(BridgeEvent::PolicyChose {
                    app_id: state.app_id().to_string(),
                    state_key,
                    action: action.to_string(),
                    value: Some(value),
                    explored: false,
                });
                action
            }
            PolicyChoice::Explore { action } => {
                self.log(BridgeEvent::PolicyChose {
                    app_id: state.app_id().to_string(),
                    state_key,
                    action: action.to_string(),
                    value: None,
                    explored: true,
                });
                action
            }
            PolicyChoice::Degraded(reason) => {
                self.stats.policy_fallbacks.fetch_add(1, Ordering::Relaxed);
                let action = self.policy.rule_based_fallback(state);
                self.log(BridgeEvent::PolicyFallback {
                    app_id: state.app_id().to_string(),
                    state_key,
                    reason: reason.as_str().to_string(),
                    action: action.to_string(),
                });
                action
            }
        }
    }

    // ──────────────────── feedback ────────────────────

    /// Report the outcome of an executed action so the policy can learn.
    ///
    /// Unknown action names and internal failures are logged and swallowed.
    pub fn provide_feedback(
        &self,
        previous: &CanonicalState,
        action_taken: &str,
        outcome: &CanonicalState,
        success: bool,
    ) -> FeedbackOutcome {
        match action_taken.parse::<ActionType>() {
            Ok(action) => self.apply_feedback(previous, action, outcome, success),
            Err(e) => self.reject_feedback(action_taken, e.to_string()),
        }
    }

    /// [`Self::provide_feedback`] with an already parsed action.
    pub fn apply_feedback(
        &self,
        previous: &CanonicalState,
        action: ActionType,
        outcome: &CanonicalState,
        success: bool,
    ) -> FeedbackOutcome {
        let learned = catch_unwind(AssertUnwindSafe(|| {
            let mut reward = self.policy.reward(previous, action, Some(outcome));
            if !success {
                reward += self.policy.feedback_failure_penalty();
            }
            self.policy
                .update(previous, action, reward, Some(outcome))
                .map(|new_value| (reward, new_value))
        }));

        match learned {
            Ok(Some((reward, new_value))) => {
                self.stats.feedback_applied.fetch_add(1, Ordering::Relaxed);
                self.log(BridgeEvent::FeedbackApplied {
                    state_key: previous.key().to_string(),
                    action: action.to_string(),
                    reward,
                    success,
                });
                FeedbackOutcome::Applied { reward, new_value }
            }
            Ok(None) => {
                self.reject_feedback(action.as_str(), "policy rejected the update".to_string())
            }
            Err(panic) => self.reject_feedback(
                action.as_str(),
                format!("feedback processing failed: {}", panic_message(panic.as_ref())),
            ),
        }
    }

    fn reject_feedback(&self, action: &str, reason: String) -> FeedbackOutcome {
        self.stats.feedback_rejected.fetch_add(1, Ordering::Relaxed);
        match &self.logger {
            Some(logger) => logger.send(BridgeEvent::FeedbackRejected {
                action: action.to_string(),
                reason: reason.clone(),
            }),
            None => eprintln!("[SDB-BRIDGE] feedback for {action:?} rejected: {reason}"),
        }
        FeedbackOutcome::Rejected { reason }
    }

    // ──────────────────── queries ────────────────────

    /// Canonical form of `payload`, as the pipeline would compute it.
    #[must_use]
    pub fn canonical_state(&self, payload: &RuntimeTelemetry) -> Option<CanonicalState> {
        if !self.validator.validate(payload).valid {
            return None;
        }
        self.adapter.convert_quiet(payload)
    }

    #[must_use]
    pub fn blocked_actions(&self) -> Vec<BlockedAction> {
        self.audit.blocked_actions()
    }

    #[must_use]
    pub fn safe_downgrades(&self) -> Vec<SafeDowngrade> {
        self.audit.safe_downgrades()
    }

    #[must_use]
    pub fn policy_summary(&self) -> PolicySummary {
        self.policy.summary()
    }

    #[must_use]
    pub fn state_action_values(&self, state: &CanonicalState) -> ActionValues {
        self.policy.state_action_values(state)
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BridgeStats {
            decisions: load(&self.stats.decisions),
            fallbacks: load(&self.stats.fallbacks),
            downgrades: load(&self.stats.downgrades),
            policy_fallbacks: load(&self.stats.policy_fallbacks),
            feedback_applied: load(&self.stats.feedback_applied),
            feedback_rejected: load(&self.stats.feedback_rejected),
        }
    }

    fn log(&self, event: BridgeEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::agent::PolicyParameters;
    use crate::policy::reward::RewardWeights;
    use crate::state::contract::ValidationCode;
    use serde_json::json;

    fn bridge() -> DecisionBridge {
        let policy = QLearningPolicy::new(
            PolicyParameters {
                epsilon: 0.0,
                ..PolicyParameters::default()
            },
            RewardWeights::default(),
        )
        .unwrap()
        .with_seed(1);
        DecisionBridge::new(Arc::new(policy))
    }

    fn telemetry(value: serde_json::Value) -> RuntimeTelemetry {
        RuntimeTelemetry::new(value)
    }

    struct PanickingPolicy;

    impl ActionPolicy for PanickingPolicy {
        fn choose_action(&self, _: &CanonicalState) -> PolicyChoice {
            panic!("table exploded")
        }
        fn reward(&self, _: &CanonicalState, _: ActionType, _: Option<&CanonicalState>) -> f64 {
            panic!("reward exploded")
        }
        fn feedback_failure_penalty(&self) -> f64 {
            0.0
        }
        fn update(
            &self,
            _: &CanonicalState,
            _: ActionType,
            _: f64,
            _: Option<&CanonicalState>,
        ) -> Option<f64> {
            None
        }
        fn state_action_values(&self, _: &CanonicalState) -> ActionValues {
            ActionValues::zeroed()
        }
        fn summary(&self) -> PolicySummary {
            PolicySummary {
                states_learned: 0,
                total_experiences: 0,
                parameters: PolicyParameters::default(),
                reward_weights: RewardWeights::default(),
                timestamp: String::new(),
            }
        }
    }

    #[test]
    fn contract_failure_returns_noop_and_records_payload() {
        let bridge = bridge();
        let decision = bridge.process_runtime_state(&telemetry(json!({
            "app": "svc", "env": "qa", "state": "healthy"
        })));
        assert!(decision.is_fallback());
        assert!(decision.fallback_reason().unwrap().contains("Invalid env"));

        let blocked = bridge.blocked_actions();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].kind, BlockKind::ContractViolation);
        assert!(blocked[0].reason.starts_with("Contract validation failed: "));
        assert_eq!(blocked[0].validation_code, Some(ValidationCode::InvalidEnv));
        assert_eq!(blocked[0].payload.as_ref().unwrap()["env"], "qa");
        assert_eq!(bridge.policy_summary().states_learned, 0);
    }

    #[test]
    fn incomplete_payload_never_reaches_the_adapter() {
        let (logger, rx) = ActivityLoggerHandle::detached(64);
        let bridge = bridge().with_logger(logger);
        let decision =
            bridge.process_runtime_state(&telemetry(json!({"app": "svc", "latency_ms": 300})));
        assert!(decision.is_fallback());

        let events: Vec<BridgeEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            BridgeEvent::ContractRejected { code, message, .. } => {
                assert_eq!(code, "incomplete_data");
                assert_eq!(message, "Missing required fields: [env, state]");
            }
            other => panic!("expected a contract rejection, got {other:?}"),
        }
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, BridgeEvent::StateConverted { .. }))
        );
    }

    #[test]
    fn untrained_policy_uses_rule_based_fallback() {
        let bridge = bridge();
        let decision = bridge.process_runtime_state(&telemetry(json!({
            "app": "svc", "env": "dev", "state": "degraded", "latency_ms": 300, "errors_last_min": 2
        })));
        assert_eq!(decision.action(), ActionType::ScaleUp);
        assert_eq!(bridge.stats().policy_fallbacks, 1);
        assert_eq!(bridge.stats().fallbacks, 0);
    }

    #[test]
    fn downgrade_is_recorded_before_decision() {
        let bridge = bridge();
        let decision = bridge.process_runtime_state(&telemetry(json!({
            "app": "svc", "env": "stage", "state": "failing", "latency_ms": 900, "errors_last_min": 30
        })));
        assert_eq!(decision.action(), ActionType::Noop);
        assert!(!decision.is_fallback());
        let downgrades = bridge.safe_downgrades();
        assert_eq!(downgrades.len(), 1);
        assert_eq!(downgrades[0].original_action, ActionType::Restart);
        assert_eq!(downgrades[0].env, "stage");
    }

    #[test]
    fn panicking_policy_is_contained() {
        let bridge = DecisionBridge::new(Arc::new(PanickingPolicy));
        let decision = bridge.process_runtime_state(&telemetry(json!({
            "app": "svc", "env": "dev", "state": "healthy"
        })));
        assert!(decision.is_fallback());
        assert!(decision.fallback_reason().unwrap().contains("table exploded"));

        let blocked = bridge.blocked_actions();
        assert_eq!(blocked[0].kind, BlockKind::InternalFailure);
        assert_eq!(blocked[0].exception.as_deref(), Some("table exploded"));
    }

    #[test]
    fn feedback_with_unknown_action_is_rejected() {
        let bridge = bridge();
        let state = bridge
            .canonical_state(&telemetry(json!({"app": "svc", "env": "dev", "state": "failing"})))
            .unwrap();
        let outcome = bridge.provide_feedback(&state, "REBOOT", &state, true);
        assert!(matches!(outcome, FeedbackOutcome::Rejected { .. }));
        assert_eq!(bridge.stats().feedback_rejected, 1);
        assert_eq!(bridge.policy_summary().total_experiences, 0);
    }

    #[test]
    fn feedback_panic_is_swallowed() {
        let bridge = DecisionBridge::new(Arc::new(PanickingPolicy));
        let state = bridge
            .canonical_state(&telemetry(json!({"app": "svc", "env": "dev", "state": "failing"})))
            .unwrap();
        let outcome = bridge.provide_feedback(&state, "RESTART", &state, true);
        match outcome {
            FeedbackOutcome::Rejected { reason } => assert!(reason.contains("reward exploded")),
            FeedbackOutcome::Applied { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn failed_execution_adds_penalty() {
        let bridge = bridge();
        let raw = telemetry(json!({
            "app": "svc", "env": "dev", "state": "failing", "errors_last_min": 25
        }));
        let prev = bridge.canonical_state(&raw).unwrap();
        let next = bridge.canonical_state(&raw).unwrap();

        let FeedbackOutcome::Applied { reward: ok, .. } =
            bridge.provide_feedback(&prev, "RESTART", &next, true)
        else {
            panic!("expected applied");
        };
        let FeedbackOutcome::Applied { reward: failed, .. } =
            bridge.provide_feedback(&prev, "RESTART", &next, false)
        else {
            panic!("expected applied");
        };
        assert!((ok - 7.0).abs() < 1e-9);
        assert!((failed - (-13.0)).abs() < 1e-9);
        assert_eq!(bridge.stats().feedback_applied, 2);
    }

    #[test]
    fn canonical_state_requires_valid_contract() {
        let bridge = bridge();
        assert!(bridge.canonical_state(&telemetry(json!({"app": "svc"}))).is_none());
    }

    #[test]
    fn logger_sees_pipeline_events() {
        let (logger, rx) = ActivityLoggerHandle::detached(64);
        let bridge = bridge().with_logger(logger);
        bridge.process_runtime_state(&telemetry(json!({
            "app": "svc", "env": "prod", "state": "failing", "errors_last_min": 20
        })));
        let events: Vec<BridgeEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], BridgeEvent::StateConverted { .. }));
        assert!(events.iter().any(|e| matches!(e, BridgeEvent::PolicyFallback { .. })));
        assert!(events.iter().any(|e| matches!(e, BridgeEvent::SafetyDowngrade { .. })));
        assert!(matches!(events.last(), Some(BridgeEvent::DecisionIssued { .. })));
    }
}
