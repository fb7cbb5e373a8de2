//! Property-based tests for bridge invariants.
//!
//! Arbitrary telemetry (well-formed or not) must always yield one of the two
//! decision shapes, prod must never see a mutating action beyond
//! `SCALE_UP`, and the guard and validator must stay pure.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};

use super::decision::Decision;
use super::service::DecisionBridge;
use crate::guard::safety::SafetyGuard;
use crate::policy::action::ActionType;
use crate::policy::agent::{ActionPolicy, PolicyParameters, QLearningPolicy};
use crate::policy::reward::RewardWeights;
use crate::state::adapter::StateAdapter;
use crate::state::canonical::{CanonicalState, Environment, HealthBand, LatencyBucket};
use crate::state::contract::ContractValidator;
use crate::state::telemetry::RuntimeTelemetry;

// ──────────────────── strategies ────────────────────

fn arb_action() -> impl Strategy<Value = ActionType> {
    prop::sample::select(ActionType::ALL.to_vec())
}

fn arb_env_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("dev".to_string()),
        Just("stage".to_string()),
        Just("prod".to_string()),
        Just("Prod".to_string()),
        Just(" stage".to_string()),
        "[a-z]{0,6}",
    ]
}

fn arb_state_label() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!("healthy")),
        Just(json!("degraded")),
        Just(json!("failing")),
        Just(json!("FAILING")),
        Just(json!(3)),
        Just(Value::Null),
    ]
}

fn arb_number_like() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0u32..5000).prop_map(|n| json!(n)),
        (-50i64..0).prop_map(|n| json!(n)),
        (0.0f64..3000.0).prop_map(|f| json!(f)),
        "[0-9]{1,4}".prop_map(Value::String),
        Just(json!("slow")),
        Just(Value::Null),
    ]
}

/// Mostly well-formed telemetry with every field independently optional.
fn arb_payload() -> impl Strategy<Value = Value> {
    (
        prop::option::of(prop_oneof![Just(json!("checkout")), Just(json!("  ")), Just(json!(7))]),
        prop::option::of(arb_env_label().prop_map(Value::String)),
        prop::option::of(arb_state_label()),
        prop::option::of(arb_number_like()),
        prop::option::of(arb_number_like()),
    )
        .prop_map(|(app, env, state, latency, errors)| {
            let mut obj = serde_json::Map::new();
            for (key, value) in [
                ("app", app),
                ("env", env),
                ("state", state),
                ("latency_ms", latency),
                ("errors_last_min", errors),
            ] {
                if let Some(value) = value {
                    obj.insert(key.to_string(), value);
                }
            }
            Value::Object(obj)
        })
}

fn arb_any_payload() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => arb_payload(),
        1 => Just(json!([1, 2, 3])),
        1 => Just(json!("not a mapping")),
        1 => Just(Value::Null),
    ]
}

fn arb_canonical() -> impl Strategy<Value = CanonicalState> {
    (
        prop::sample::select(Environment::ALL.to_vec()),
        prop::sample::select(HealthBand::ALL.to_vec()),
        prop::sample::select(LatencyBucket::ALL.to_vec()),
        0u64..40,
    )
        .prop_map(|(env, band, latency, failures)| {
            CanonicalState::from_parts("svc".to_string(), env, band, latency, failures)
        })
}

fn exploring_bridge(seed: u64) -> DecisionBridge {
    let policy = QLearningPolicy::new(
        PolicyParameters {
            epsilon: 0.5,
            ..PolicyParameters::default()
        },
        RewardWeights::default(),
    )
    .unwrap()
    .with_seed(seed);
    DecisionBridge::new(Arc::new(policy))
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn every_payload_yields_a_well_formed_decision(
        payload in arb_any_payload(),
        seed in any::<u64>(),
    ) {
        let bridge = exploring_bridge(seed);
        let decision = bridge.process_runtime_state(&RuntimeTelemetry::new(payload));
        match &decision {
            Decision::Fallback(f) => {
                prop_assert_eq!(f.action, ActionType::Noop);
                prop_assert!(f.safe_fallback);
            }
            Decision::Approved(d) => {
                prop_assert!(d.safe_for_execution);
                prop_assert!((0.0..=1.0).contains(&d.confidence));
                prop_assert!(!d.app_id.trim().is_empty());
            }
        }
    }

    #[test]
    fn prod_decisions_stay_in_envelope(
        state in arb_state_label(),
        latency in arb_number_like(),
        errors in arb_number_like(),
        seed in any::<u64>(),
    ) {
        let bridge = exploring_bridge(seed);
        let payload = json!({
            "app": "checkout", "env": "prod", "state": state,
            "latency_ms": latency, "errors_last_min": errors
        });
        for _ in 0..5 {
            let telemetry = RuntimeTelemetry::new(payload.clone());
            let action = bridge.process_runtime_state(&telemetry).action();
            prop_assert!(matches!(action, ActionType::Noop | ActionType::ScaleUp));
        }
    }

    #[test]
    fn missing_required_field_always_falls_back(payload in arb_payload()) {
        let complete = ["app", "env", "state"]
            .iter()
            .all(|k| payload.get(k).is_some());
        prop_assume!(!complete);
        let bridge = exploring_bridge(0);
        let decision = bridge.process_runtime_state(&RuntimeTelemetry::new(payload));
        prop_assert!(decision.is_fallback());
        prop_assert_eq!(bridge.policy_summary().states_learned, 0);
    }

    #[test]
    fn validation_is_idempotent(payload in arb_any_payload()) {
        let validator = ContractValidator::new();
        let telemetry = RuntimeTelemetry::new(payload);
        prop_assert_eq!(validator.validate(&telemetry), validator.validate(&telemetry));
    }

    #[test]
    fn adapter_is_deterministic(payload in arb_payload()) {
        let adapter = StateAdapter::default();
        let telemetry = RuntimeTelemetry::new(payload);
        prop_assert_eq!(adapter.convert(&telemetry), adapter.convert(&telemetry));
    }

    #[test]
    fn guard_only_ever_downgrades_to_noop(action in arb_action(), env in arb_env_label()) {
        let guard = SafetyGuard::new();
        let verdict = guard.apply(action, &env);
        prop_assert_eq!(verdict, guard.apply(action, &env));
        if verdict.downgraded {
            prop_assert_eq!(verdict.action, ActionType::Noop);
            prop_assert_ne!(action, ActionType::Noop);
        } else {
            prop_assert_eq!(verdict.action, action);
        }
    }

    #[test]
    fn repeated_terminal_updates_approach_reward(
        state in arb_canonical(),
        action in arb_action(),
        reward in -50.0f64..50.0,
        alpha in 0.05f64..0.95,
    ) {
        let policy = QLearningPolicy::new(
            PolicyParameters { alpha, gamma: 0.9, epsilon: 0.0 },
            RewardWeights::default(),
        )
        .unwrap();
        let mut gap = reward.abs();
        for _ in 0..20 {
            let value = policy.update(&state, action, reward, None).unwrap();
            let next_gap = (reward - value).abs();
            prop_assert!(next_gap <= gap + 1e-12);
            gap = next_gap;
        }
    }

    #[test]
    fn rule_based_fallback_is_total(state in arb_canonical()) {
        let policy =
            QLearningPolicy::new(PolicyParameters::default(), RewardWeights::default()).unwrap();
        let action = policy.rule_based_fallback(&state);
        prop_assert!(ActionType::ALL.contains(&action));
    }
}
