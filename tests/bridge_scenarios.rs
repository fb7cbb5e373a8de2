//! End-to-end decision scenarios through the public API.
//!
//! Each test drives raw telemetry through validation, adaptation, policy and
//! guard, and checks both the returned decision and the audit trail.

mod common;

use std::sync::Arc;
use std::thread;

use safe_decision_bridge::prelude::*;
use serde_json::json;

use common::{greedy_bridge, payload, telemetry};

// ══════════════════════════════════════════════════════════════════
// Guarded decisions
// ══════════════════════════════════════════════════════════════════

#[test]
fn failing_prod_service_is_downgraded_to_noop() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&payload("checkout", "prod", "failing", 1500, 25));

    let approved = decision.as_approved().expect("approved shape");
    assert_eq!(approved.action, ActionType::Noop);
    assert_eq!(approved.env, Environment::Prod);
    assert_eq!(approved.app_id, "checkout");
    assert!(approved.safe_for_execution);
    assert!(approved.reasoning.contains("RESTART not allowed in prod"));

    let downgrades = bridge.safe_downgrades();
    assert_eq!(downgrades.len(), 1);
    assert_eq!(downgrades[0].original_action, ActionType::Restart);
    assert_eq!(downgrades[0].safe_action, ActionType::Noop);
    assert_eq!(downgrades[0].reason, "Action RESTART not allowed in prod");
    assert!(bridge.blocked_actions().is_empty());
}

#[test]
fn failing_dev_service_restarts() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&payload("checkout", "dev", "failing", 1500, 25));
    assert_eq!(decision.action(), ActionType::Restart);
    assert!(!decision.is_fallback());
    assert!(bridge.safe_downgrades().is_empty());
}

#[test]
fn healthy_stage_service_scales_down() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&payload("search", "stage", "healthy", 50, 0));
    assert_eq!(decision.action(), ActionType::ScaleDown);
    assert_eq!(decision.as_approved().unwrap().confidence, 1.0);
}

#[test]
fn degraded_stage_service_scales_up() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&payload("search", "stage", "degraded", 400, 6));
    assert_eq!(decision.action(), ActionType::ScaleUp);
}

// ══════════════════════════════════════════════════════════════════
// Rejected payloads
// ══════════════════════════════════════════════════════════════════

#[test]
fn missing_fields_yield_noop_fallback() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&telemetry(json!({"app": "checkout"})));

    assert!(decision.is_fallback());
    assert_eq!(decision.action(), ActionType::Noop);
    let reason = decision.fallback_reason().unwrap();
    assert!(reason.contains("env"), "{reason}");
    assert!(reason.contains("state"), "{reason}");

    let blocked = bridge.blocked_actions();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].validation_code, Some(ValidationCode::IncompleteData));
    assert!(blocked[0].reason.starts_with("Contract validation failed"));

    let wire = serde_json::to_value(&decision).unwrap();
    assert_eq!(wire["safe_fallback"], true);
    assert!(wire.get("app_id").is_none());
}

#[test]
fn rejected_payload_skips_conversion() {
    let (logger, events) = ActivityLoggerHandle::detached(64);
    let bridge = greedy_bridge().with_logger(logger);
    let decision = bridge.process_runtime_state(&telemetry(json!({
        "app": "svc", "latency_ms": 300
    })));
    assert!(decision.is_fallback());

    let events: Vec<BridgeEvent> = events.try_iter().collect();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, BridgeEvent::ContractRejected { .. }))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, BridgeEvent::StateConverted { .. }))
    );
}

#[test]
fn unknown_environment_is_rejected() {
    let bridge = greedy_bridge();
    let decision = bridge.process_runtime_state(&payload("checkout", "qa", "healthy", 10, 0));
    assert!(decision.is_fallback());
    assert_eq!(
        bridge.blocked_actions()[0].validation_code,
        Some(ValidationCode::InvalidEnv)
    );
}

#[test]
fn non_mapping_payloads_never_error() {
    let bridge = greedy_bridge();
    for raw in [json!(null), json!([1, 2]), json!("prod"), json!(42)] {
        let decision = bridge.process_runtime_state(&telemetry(raw));
        assert!(decision.is_fallback());
    }
    assert_eq!(bridge.blocked_actions().len(), 4);
    assert_eq!(bridge.stats().fallbacks, 4);
}

// ══════════════════════════════════════════════════════════════════
// Feedback
// ══════════════════════════════════════════════════════════════════

#[test]
fn positive_feedback_overrides_rule_based_choice() {
    let bridge = greedy_bridge();
    let raw = payload("api", "dev", "degraded", 300, 5);
    let state = bridge.canonical_state(&raw).unwrap();
    assert_eq!(bridge.process_runtime_state(&raw).action(), ActionType::ScaleUp);

    for _ in 0..5 {
        let outcome = bridge.provide_feedback(&state, "RESTART", &state, true);
        assert!(matches!(outcome, FeedbackOutcome::Applied { .. }));
    }

    assert_eq!(bridge.process_runtime_state(&raw).action(), ActionType::Restart);
    assert_eq!(bridge.policy_summary().states_learned, 1);
    assert_eq!(bridge.policy_summary().total_experiences, 5);
}

#[test]
fn failed_feedback_is_penalized() {
    let bridge = greedy_bridge();
    let state = bridge
        .canonical_state(&payload("api", "dev", "failing", 900, 20))
        .unwrap();
    let FeedbackOutcome::Applied { reward, new_value } =
        bridge.provide_feedback(&state, "RESTART", &state, false)
    else {
        panic!("feedback should apply");
    };
    assert!(reward < 0.0);
    assert!(new_value < 0.0);
    assert!(bridge.state_action_values(&state).get(ActionType::Restart) < 0.0);
}

#[test]
fn unknown_action_feedback_is_rejected() {
    let bridge = greedy_bridge();
    let state = bridge
        .canonical_state(&payload("api", "dev", "healthy", 10, 0))
        .unwrap();
    let outcome = bridge.provide_feedback(&state, "DELETE_EVERYTHING", &state, true);
    assert!(matches!(outcome, FeedbackOutcome::Rejected { .. }));
    assert_eq!(bridge.policy_summary().states_learned, 0);
    assert_eq!(bridge.stats().feedback_rejected, 1);
}

// ══════════════════════════════════════════════════════════════════
// Concurrency
// ══════════════════════════════════════════════════════════════════

#[test]
fn concurrent_callers_share_one_bridge() {
    let bridge = Arc::new(greedy_bridge());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let env = ["dev", "stage", "prod"][i % 3];
                for n in 0..50 {
                    let raw = payload(&format!("svc-{i}"), env, "failing", 800, 20);
                    let decision = bridge.process_runtime_state(&raw);
                    if env == "prod" {
                        assert!(matches!(
                            decision.action(),
                            ActionType::Noop | ActionType::ScaleUp
                        ));
                    }
                    if n % 5 == 0 {
                        let state = bridge.canonical_state(&raw).unwrap();
                        bridge.provide_feedback(&state, decision.action().as_str(), &state, true);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = bridge.stats();
    assert_eq!(stats.decisions, 400);
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(stats.feedback_applied, 80);
    assert_eq!(bridge.policy_summary().total_experiences, 80);
}
