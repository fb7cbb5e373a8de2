//! Tabular Q-learning policy.
//!
//! The table, the RNG, and the bookkeeping counters share one
//! `parking_lot::Mutex`, held only for a single lookup/insert or update.
//! Snapshots are cloned under the lock and handed to the writer thread after
//! it is released.

use std::path::Path;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use serde::{Deserialize, Serialize};

use crate::core::config::Config;
use crate::core::errors::{BridgeError, Result};
use crate::core::now_rfc3339;
use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent};
use crate::policy::action::ActionType;
use crate::policy::fallback::rule_based_action;
use crate::policy::persist::SnapshotWriterHandle;
use crate::policy::reward::RewardWeights;
use crate::policy::snapshot::PolicySnapshot;
use crate::policy::table::{ActionValues, QTable};
use crate::state::canonical::{CanonicalState, StateKey};

// ──────────────────── parameters ────────────────────

/// Learning rate, discount and exploration probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyParameters {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for PolicyParameters {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
        }
    }
}

impl PolicyParameters {
    /// Every parameter must be a finite value in `[0, 1]`.
    pub fn check(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("gamma", self.gamma),
            ("epsilon", self.epsilon),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        Ok(())
    }

    /// [`Self::check`] as a configuration error.
    pub fn validate(&self) -> Result<()> {
        self.check()
            .map_err(|details| BridgeError::InvalidConfig { details })
    }
}

/// When the policy schedules a snapshot write. Zero disables a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotTriggers {
    pub every_new_states: u64,
    pub every_updates: u64,
}

impl Default for SnapshotTriggers {
    fn default() -> Self {
        Self {
            every_new_states: 10,
            every_updates: 0,
        }
    }
}

// ──────────────────── choice ────────────────────

/// Why the learned policy declined to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The state's row has never been updated.
    UntrainedState,
    /// The state's row holds NaN or infinite estimates.
    NonFiniteEstimates,
}

impl DegradedReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UntrainedState => "untrained_state",
            Self::NonFiniteEstimates => "non_finite_estimates",
        }
    }
}

/// Outcome of [`ActionPolicy::choose_action`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyChoice {
    /// Greedy action from learned estimates.
    Exploit { action: ActionType, value: f64 },
    /// Uniformly random exploratory action.
    Explore { action: ActionType },
    /// No trustworthy answer; the caller should use the rule-based fallback.
    Degraded(DegradedReason),
}

impl PolicyChoice {
    /// Proposed action, if any.
    #[must_use]
    pub const fn action(&self) -> Option<ActionType> {
        match self {
            Self::Exploit { action, .. } | Self::Explore { action } => Some(*action),
            Self::Degraded(_) => None,
        }
    }
}

/// Read-only policy overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub states_learned: usize,
    pub total_experiences: u64,
    pub parameters: PolicyParameters,
    pub reward_weights: RewardWeights,
    pub timestamp: String,
}

/// Result of [`QLearningPolicy::load_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLoadOutcome {
    /// Snapshot applied.
    Restored { states: usize },
    /// No snapshot on disk; the table starts empty.
    Fresh,
    /// Snapshot unusable; the table starts empty.
    Discarded { error_code: String, error_message: String },
}

// ──────────────────── trait ────────────────────

/// Action-selection seam used by the decision bridge.
pub trait ActionPolicy: Send + Sync {
    /// Propose an action for `state`, inserting a zero row when unseen.
    fn choose_action(&self, state: &CanonicalState) -> PolicyChoice;

    /// Deterministic heuristic used when the learned policy degrades.
    fn rule_based_fallback(&self, state: &CanonicalState) -> ActionType {
        rule_based_action(state)
    }

    /// Reward for `action` in `state`, optionally observing `next`.
    fn reward(
        &self,
        state: &CanonicalState,
        action: ActionType,
        next: Option<&CanonicalState>,
    ) -> f64;

    /// Extra reward applied when feedback reports a failed execution.
    fn feedback_failure_penalty(&self) -> f64;

    /// Apply one Q-learning step. Returns the new estimate, or `None` when
    /// the update was rejected.
    fn update(
        &self,
        state: &CanonicalState,
        action: ActionType,
        reward: f64,
        next: Option<&CanonicalState>,
    ) -> Option<f64>;

    /// Row for `state` without inserting; zeros when unseen.
    fn state_action_values(&self, state: &CanonicalState) -> ActionValues;

    fn summary(&self) -> PolicySummary;
}

// ──────────────────── policy ────────────────────

struct PolicyInner {
    table: QTable,
    params: PolicyParameters,
    weights: RewardWeights,
    rng: StdRng,
    total_experiences: u64,
    new_states_since_snapshot: u64,
    updates_since_snapshot: u64,
    snapshot_sequence: u64,
}

impl PolicyInner {
    fn snapshot(&mut self) -> PolicySnapshot {
        self.snapshot_sequence += 1;
        PolicySnapshot {
            q_table: self.table.clone(),
            reward_weights: self.weights,
            parameters: self.params,
            last_updated: now_rfc3339(),
            total_states_learned: self.table.len(),
            total_experiences: self.total_experiences,
            sequence: self.snapshot_sequence,
        }
    }

    fn note_row(&mut self, inserted: bool) {
        if inserted {
            self.new_states_since_snapshot += 1;
        }
    }
}

/// Epsilon-greedy tabular Q-learning policy.
pub struct QLearningPolicy {
    inner: Mutex<PolicyInner>,
    triggers: SnapshotTriggers,
    writer: Option<SnapshotWriterHandle>,
    logger: Option<ActivityLoggerHandle>,
}

impl QLearningPolicy {
    /// Empty policy seeded from OS entropy.
    pub fn new(params: PolicyParameters, weights: RewardWeights) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            inner: Mutex::new(PolicyInner {
                table: QTable::new(),
                params,
                weights,
                rng: StdRng::from_os_rng(),
                total_experiences: 0,
                new_states_since_snapshot: 0,
                updates_since_snapshot: 0,
                snapshot_sequence: 0,
            }),
            triggers: SnapshotTriggers::default(),
            writer: None,
            logger: None,
        })
    }

    /// Policy built from the `[policy]`, `[rewards]` and `[persistence]`
    /// sections. No writer is attached; see [`Self::with_snapshot_writer`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = Self::new(config.policy.parameters(), config.rewards)?
            .with_triggers(config.persistence.triggers());
        Ok(match config.policy.seed {
            Some(seed) => policy.with_seed(seed),
            None => policy,
        })
    }

    /// Reseed exploration for reproducible runs.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        self.inner.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn with_triggers(mut self, triggers: SnapshotTriggers) -> Self {
        self.triggers = triggers;
        self
    }

    #[must_use]
    pub fn with_snapshot_writer(mut self, writer: SnapshotWriterHandle) -> Self {
        self.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn parameters(&self) -> PolicyParameters {
        self.inner.lock().params
    }

    #[must_use]
    pub fn reward_weights(&self) -> RewardWeights {
        self.inner.lock().weights
    }

    /// Capture the full policy state.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        self.inner.lock().snapshot()
    }

    /// Replace the table, parameters and weights with `snapshot`.
    pub fn restore(&self, snapshot: PolicySnapshot) -> Result<()> {
        snapshot
            .check()
            .map_err(|details| BridgeError::InvalidConfig { details })?;
        let mut inner = self.inner.lock();
        inner.snapshot_sequence = inner.snapshot_sequence.max(snapshot.sequence);
        inner.table = snapshot.q_table;
        inner.params = snapshot.parameters;
        inner.weights = snapshot.reward_weights;
        inner.total_experiences = snapshot.total_experiences;
        inner.new_states_since_snapshot = 0;
        inner.updates_since_snapshot = 0;
        Ok(())
    }

    /// Load `path` into the policy. Never fails: missing or unusable
    /// snapshots leave the table empty and are reported in the outcome.
    pub fn load_snapshot(&self, path: &Path) -> SnapshotLoadOutcome {
        let outcome = match PolicySnapshot::load(path) {
            Ok(Some(snapshot)) => {
                let states = snapshot.q_table.len();
                match self.restore(snapshot) {
                    Ok(()) => SnapshotLoadOutcome::Restored { states },
                    Err(e) => discarded(&e),
                }
            }
            Ok(None) => SnapshotLoadOutcome::Fresh,
            Err(e) => discarded(&e),
        };

        let path_str = path.display().to_string();
        let event = match &outcome {
            SnapshotLoadOutcome::Restored { states } => BridgeEvent::SnapshotLoaded {
                path: path_str,
                states: *states,
            },
            SnapshotLoadOutcome::Fresh => BridgeEvent::SnapshotFresh { path: path_str },
            SnapshotLoadOutcome::Discarded {
                error_code,
                error_message,
            } => BridgeEvent::SnapshotDiscarded {
                path: path_str,
                error_code: error_code.clone(),
                error_message: error_message.clone(),
            },
        };
        match &self.logger {
            Some(logger) => logger.send(event),
            None => {
                if let SnapshotLoadOutcome::Discarded { error_message, .. } = &outcome {
                    eprintln!("[SDB-POLICY] discarding snapshot: {error_message}");
                }
            }
        }
        outcome
    }

    /// Synchronously write the current snapshot through the writer thread.
    /// No-op when persistence is disabled.
    pub fn flush(&self) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.new_states_since_snapshot = 0;
            inner.updates_since_snapshot = 0;
            inner.snapshot()
        };
        writer.write_sync(snapshot)
    }

    /// Write the current snapshot directly to `path`, bypassing the writer.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.snapshot().store_atomic(path)
    }

    /// Clone a snapshot when a trigger has fired. Caller holds the lock and
    /// must submit the result only after releasing it.
    fn due_snapshot(&self, inner: &mut PolicyInner) -> Option<PolicySnapshot> {
        self.writer.as_ref()?;
        let by_states = self.triggers.every_new_states > 0
            && inner.new_states_since_snapshot >= self.triggers.every_new_states;
        let by_updates = self.triggers.every_updates > 0
            && inner.updates_since_snapshot >= self.triggers.every_updates;
        if !(by_states || by_updates) {
            return None;
        }
        inner.new_states_since_snapshot = 0;
        inner.updates_since_snapshot = 0;
        Some(inner.snapshot())
    }

    fn submit(&self, snapshot: Option<PolicySnapshot>) {
        if let (Some(writer), Some(snapshot)) = (&self.writer, snapshot) {
            writer.submit(snapshot);
        }
    }

    fn log(&self, event: BridgeEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn discarded(e: &BridgeError) -> SnapshotLoadOutcome {
    SnapshotLoadOutcome::Discarded {
        error_code: e.code().to_string(),
        error_message: e.to_string(),
    }
}

impl ActionPolicy for QLearningPolicy {
    fn choose_action(&self, state: &CanonicalState) -> PolicyChoice {
        let (choice, due) = {
            let mut inner = self.inner.lock();
            let (row, inserted) = inner.table.ensure_row(state.key());
            let row = *row;
            inner.note_row(inserted);

            let choice = if row.has_non_finite() {
                PolicyChoice::Degraded(DegradedReason::NonFiniteEstimates)
            } else if inner.rng.random::<f64>() < inner.params.epsilon {
                let pick = inner.rng.random_range(0..ActionType::COUNT);
                PolicyChoice::Explore {
                    action: ActionType::ALL[pick],
                }
            } else if row.is_untrained() {
                PolicyChoice::Degraded(DegradedReason::UntrainedState)
            } else {
                let (action, value) = row.best();
                PolicyChoice::Exploit { action, value }
            };

            let due = if inserted {
                self.due_snapshot(&mut inner)
            } else {
                None
            };
            (choice, due)
        };
        self.submit(due);
        choice
    }

    fn reward(
        &self,
        state: &CanonicalState,
        action: ActionType,
        next: Option<&CanonicalState>,
    ) -> f64 {
        let weights = self.inner.lock().weights;
        weights.reward(state, action, next)
    }

    fn feedback_failure_penalty(&self) -> f64 {
        self.inner.lock().weights.feedback_failure_penalty
    }

    fn update(
        &self,
        state: &CanonicalState,
        action: ActionType,
        reward: f64,
        next: Option<&CanonicalState>,
    ) -> Option<f64> {
        let key = state.key();
        if !reward.is_finite() {
            let err = BridgeError::NonFiniteReward {
                state_key: key.to_string(),
                action: action.as_str().to_string(),
                value: reward,
            };
            self.log(BridgeEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            return None;
        }

        let (old_value, new_value, due) = {
            let mut inner = self.inner.lock();
            let PolicyParameters { alpha, gamma, .. } = inner.params;

            let next_max = match next {
                Some(next_state) => {
                    let (row, inserted) = inner.table.ensure_row(next_state.key());
                    let best = row.max_value();
                    inner.note_row(inserted);
                    best
                }
                None => 0.0,
            };

            let (row, inserted) = inner.table.ensure_row(key);
            let old_value = row.get(action);
            let new_value = old_value + alpha * (reward + gamma * next_max - old_value);
            row.set(action, new_value);
            inner.note_row(inserted);

            inner.total_experiences += 1;
            inner.updates_since_snapshot += 1;
            (old_value, new_value, self.due_snapshot(&mut inner))
        };
        self.submit(due);

        self.log(BridgeEvent::QValueUpdated {
            state_key: key.to_string(),
            action: action.as_str().to_string(),
            reward,
            old_value,
            new_value,
        });
        Some(new_value)
    }

    fn state_action_values(&self, state: &CanonicalState) -> ActionValues {
        let key: StateKey = state.key();
        self.inner
            .lock()
            .table
            .row(&key)
            .copied()
            .unwrap_or_default()
    }

    fn summary(&self) -> PolicySummary {
        let inner = self.inner.lock();
        PolicySummary {
            states_learned: inner.table.len(),
            total_experiences: inner.total_experiences,
            parameters: inner.params,
            reward_weights: inner.weights,
            timestamp: now_rfc3339(),
        }
    }
}
