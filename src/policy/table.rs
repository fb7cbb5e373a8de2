//! Tabular action-value store.
//!
//! Rows are keyed by [`StateKey`] and hold one estimate per [`ActionType`].
//! Rows are only ever inserted; the whole table may be swapped on reload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::policy::action::ActionType;
use crate::state::canonical::StateKey;

// ──────────────────── action values ────────────────────

/// Estimates for every action in one state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<ActionType, f64>",
    into = "BTreeMap<ActionType, f64>"
)]
pub struct ActionValues([f64; ActionType::COUNT]);

impl ActionValues {
    /// A row with every estimate at zero.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0.0; ActionType::COUNT])
    }

    #[must_use]
    pub const fn get(&self, action: ActionType) -> f64 {
        self.0[action.index()]
    }

    pub fn set(&mut self, action: ActionType, value: f64) {
        self.0[action.index()] = value;
    }

    /// `(action, value)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionType, f64)> + '_ {
        ActionType::ALL.into_iter().map(|a| (a, self.get(a)))
    }

    /// Greedy action; ties go to the action declared first.
    #[must_use]
    pub fn best(&self) -> (ActionType, f64) {
        let mut best = (ActionType::ALL[0], self.0[0]);
        for (action, value) in self.iter().skip(1) {
            if value > best.1 {
                best = (action, value);
            }
        }
        best
    }

    /// Largest estimate in the row.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.best().1
    }

    /// No estimate has moved away from its initial zero.
    #[must_use]
    pub fn is_untrained(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Some estimate is NaN or infinite.
    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        self.0.iter().any(|v| !v.is_finite())
    }
}

impl From<BTreeMap<ActionType, f64>> for ActionValues {
    fn from(map: BTreeMap<ActionType, f64>) -> Self {
        let mut values = Self::zeroed();
        for (action, value) in map {
            values.set(action, value);
        }
        values
    }
}

impl From<ActionValues> for BTreeMap<ActionType, f64> {
    fn from(values: ActionValues) -> Self {
        values.iter().collect()
    }
}

// ──────────────────── table ────────────────────

/// `StateKey → ActionValues` mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QTable {
    rows: BTreeMap<StateKey, ActionValues>,
}

impl QTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct states observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row(&self, key: &StateKey) -> Option<&ActionValues> {
        self.rows.get(key)
    }

    /// Row for `key`, inserting a zeroed row first when unseen.
    ///
    /// The flag reports whether an insertion happened.
    pub fn ensure_row(&mut self, key: StateKey) -> (&mut ActionValues, bool) {
        let inserted = !self.rows.contains_key(&key);
        let row = self.rows.entry(key).or_insert_with(ActionValues::zeroed);
        (row, inserted)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &ActionValues)> {
        self.rows.iter()
    }
}
