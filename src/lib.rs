#![forbid(unsafe_code)]

//! Safe Decision Bridge (sdb): a guarded control layer between runtime-health
//! telemetry and an orchestrator.
//!
//! Every payload takes the same path:
//! 1. **Contract validation**: malformed telemetry never reaches the policy
//! 2. **State adaptation**: raw fields become a bounded canonical state
//! 3. **Policy proposal**: tabular Q-learning with a rule-based fallback
//! 4. **Safety guard**: per-environment allow-lists downgrade to `NOOP`
//!
//! Any failure along the way yields a NOOP fallback decision, never an error.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use safe_decision_bridge::prelude::*;
//! use serde_json::json;
//!
//! let runtime = BridgeRuntime::start(&Config::default()).unwrap();
//! let decision = runtime.bridge().process_runtime_state(&RuntimeTelemetry::new(json!({
//!     "app": "checkout", "env": "prod", "state": "failing", "errors_last_min": 25
//! })));
//! assert!(matches!(decision.action(), ActionType::Noop | ActionType::ScaleUp));
//! runtime.shutdown().unwrap();
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use safe_decision_bridge::core::config::Config;
//! use safe_decision_bridge::guard::safety::SafetyGuard;
//! ```

pub mod prelude;

pub mod bridge;
pub mod core;
pub mod guard;
pub mod logger;
pub mod policy;
pub mod state;
