//! Telemetry intake: raw payloads, contract validation, canonical conversion.

pub mod adapter;
pub mod canonical;
pub mod contract;
pub mod telemetry;
