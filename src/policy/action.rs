//! Orchestration actions the bridge may propose.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::BridgeError;

/// Closed set of orchestration actions.
///
/// Declaration order is the tie-break order for greedy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Leave the instance alone.
    Noop,
    /// Add capacity.
    ScaleUp,
    /// Remove capacity.
    ScaleDown,
    /// Restart the instance.
    Restart,
    /// Roll back to the previous release.
    Rollback,
}

impl ActionType {
    /// All actions in tie-break order.
    pub const ALL: [Self; 5] = [
        Self::Noop,
        Self::ScaleUp,
        Self::ScaleDown,
        Self::Restart,
        Self::Rollback,
    ];

    /// Number of actions.
    pub const COUNT: usize = Self::ALL.len();

    /// Wire name (`NOOP`, `SCALE_UP`, …).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "NOOP",
            Self::ScaleUp => "SCALE_UP",
            Self::ScaleDown => "SCALE_DOWN",
            Self::Restart => "RESTART",
            Self::Rollback => "ROLLBACK",
        }
    }

    /// Position in [`ActionType::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Noop => 0,
            Self::ScaleUp => 1,
            Self::ScaleDown => 2,
            Self::Restart => 3,
            Self::Rollback => 4,
        }
    }

    /// Whether executing the action changes the running deployment.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Noop)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = BridgeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == raw)
            .ok_or_else(|| BridgeError::UnknownAction {
                value: raw.to_string(),
            })
    }
}
