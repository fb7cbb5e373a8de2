//! Decision pipeline, audit trail and runtime wiring.

pub mod audit;
pub mod decision;
pub mod runtime;
pub mod service;

#[cfg(test)]
mod test_properties;
