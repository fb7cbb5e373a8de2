//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use safe_decision_bridge::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{BridgeError, Result};

// State
pub use crate::state::adapter::StateAdapter;
pub use crate::state::canonical::{CanonicalState, Environment, HealthBand, LatencyBucket};
pub use crate::state::contract::{ContractValidator, ValidationCode, ValidationOutcome};
pub use crate::state::telemetry::RuntimeTelemetry;

// Policy
pub use crate::policy::action::ActionType;
pub use crate::policy::agent::{
    ActionPolicy, PolicyChoice, PolicyParameters, PolicySummary, QLearningPolicy,
    SnapshotLoadOutcome,
};
pub use crate::policy::reward::RewardWeights;
pub use crate::policy::snapshot::PolicySnapshot;

// Guard
pub use crate::guard::safety::{GuardVerdict, SafetyGuard};

// Bridge
pub use crate::bridge::audit::{BlockedAction, SafeDowngrade};
pub use crate::bridge::decision::{ApprovedDecision, Decision, NoopFallback};
pub use crate::bridge::runtime::BridgeRuntime;
pub use crate::bridge::service::{BridgeStats, DecisionBridge, FeedbackOutcome};

// Logger
pub use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent};
