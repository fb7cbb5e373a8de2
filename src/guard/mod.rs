//! Environment-scoped safety envelope.

pub mod safety;
