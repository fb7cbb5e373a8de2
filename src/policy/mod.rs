//! Learned action selection: Q-table, reward model, rule-based fallback and
//! snapshot persistence.

pub mod action;
pub mod agent;
pub mod fallback;
pub mod persist;
pub mod reward;
pub mod snapshot;
pub mod table;
