#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use safe_decision_bridge::prelude::*;
use serde_json::{Value, json};

/// Deterministic config rooted in `dir`: no exploration, fixed seed.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.policy.epsilon = 0.0;
    config.policy.seed = Some(7);
    config.persistence.snapshot_path = dir.join("policy.json");
    config.logging.jsonl_path = dir.join("activity.jsonl");
    config.logging.fallback_path = None;
    config
}

/// In-memory bridge without background threads.
pub fn greedy_bridge() -> DecisionBridge {
    let policy = QLearningPolicy::new(
        PolicyParameters {
            epsilon: 0.0,
            ..PolicyParameters::default()
        },
        RewardWeights::default(),
    )
    .expect("default parameters are valid");
    DecisionBridge::new(Arc::new(policy))
}

pub fn telemetry(value: Value) -> RuntimeTelemetry {
    RuntimeTelemetry::new(value)
}

pub fn payload(
    app: &str,
    env: &str,
    state: &str,
    latency_ms: u64,
    errors: u64,
) -> RuntimeTelemetry {
    telemetry(json!({
        "app": app,
        "env": env,
        "state": state,
        "latency_ms": latency_ms,
        "errors_last_min": errors,
    }))
}

pub fn read_log_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
