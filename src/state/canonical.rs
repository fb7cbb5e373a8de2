//! Canonical decision state and its discretized table key.
//!
//! `CanonicalState` is the only representation the policy ever sees. It is
//! produced by the [`StateAdapter`](crate::state::adapter::StateAdapter) (or
//! decoded from a feedback record) and is immutable afterwards.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::BridgeError;

/// Failure counts are bucketed in steps of this many errors.
pub const FAILURE_BUCKET_WIDTH: u64 = 5;
/// Highest failure bucket; everything from 15 errors up shares it.
pub const MAX_FAILURE_BUCKET: u8 = 3;

// ──────────────────── environment ────────────────────

/// Deployment environment of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development: every action may execute.
    Dev,
    /// Staging: scaling only.
    Stage,
    /// Production: the most conservative envelope.
    Prod,
}

impl Environment {
    /// Every known environment.
    pub const ALL: [Self; 3] = [Self::Dev, Self::Stage, Self::Prod];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Stage => "stage",
            Self::Prod => "prod",
        }
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn from_literal(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|env| env.as_str() == raw)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── health band ────────────────────

/// Coarse classification of a service instance's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Healthy,
    Degraded,
    Failing,
}

impl HealthBand {
    pub const ALL: [Self; 3] = [Self::Healthy, Self::Degraded, Self::Failing];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failing => "failing",
        }
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn from_literal(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.as_str() == raw)
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── latency bucket ────────────────────

/// Coarse classification of observed request latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyBucket {
    Low,
    Medium,
    High,
    /// Latency was absent or not numeric.
    Unknown,
}

impl LatencyBucket {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Unknown];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_literal(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| bucket.as_str() == raw)
    }
}

impl fmt::Display for LatencyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── canonical state ────────────────────

/// Normalized, validated representation of one telemetry sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CanonicalStateRecord")]
pub struct CanonicalState {
    app_id: String,
    env: Environment,
    health_band: HealthBand,
    latency_bucket: LatencyBucket,
    recent_failures: u64,
}

/// Unchecked wire form; `app_id` is validated on the way in.
#[derive(Deserialize)]
struct CanonicalStateRecord {
    app_id: String,
    env: Environment,
    health_band: HealthBand,
    latency_bucket: LatencyBucket,
    #[serde(default)]
    recent_failures: u64,
}

impl TryFrom<CanonicalStateRecord> for CanonicalState {
    type Error = String;

    fn try_from(record: CanonicalStateRecord) -> Result<Self, Self::Error> {
        let app_id = record.app_id.trim();
        if app_id.is_empty() {
            return Err("app_id must be non-empty".to_string());
        }
        Ok(Self::from_parts(
            app_id.to_string(),
            record.env,
            record.health_band,
            record.latency_bucket,
            record.recent_failures,
        ))
    }
}

impl CanonicalState {
    /// Assemble a state from already-normalized parts.
    ///
    /// Callers must guarantee `app_id` is trimmed and non-empty.
    pub(crate) fn from_parts(
        app_id: String,
        env: Environment,
        health_band: HealthBand,
        latency_bucket: LatencyBucket,
        recent_failures: u64,
    ) -> Self {
        debug_assert!(!app_id.is_empty());
        Self {
            app_id,
            env,
            health_band,
            latency_bucket,
            recent_failures,
        }
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub const fn env(&self) -> Environment {
        self.env
    }

    #[must_use]
    pub const fn health_band(&self) -> HealthBand {
        self.health_band
    }

    #[must_use]
    pub const fn latency_bucket(&self) -> LatencyBucket {
        self.latency_bucket
    }

    #[must_use]
    pub const fn recent_failures(&self) -> u64 {
        self.recent_failures
    }

    /// Discretized key used to index the action-value table.
    #[must_use]
    pub fn key(&self) -> StateKey {
        StateKey::from_state(self)
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} health={} latency={} failures={}",
            self.app_id, self.env, self.health_band, self.latency_bucket, self.recent_failures
        )
    }
}

// ──────────────────── state key ────────────────────

/// `(health_band, latency_bucket, failure_bucket)` index into the Q-table.
///
/// Text form is `{health}_{latency}_{bucket}`, e.g. `failing_high_3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub health_band: HealthBand,
    pub latency_bucket: LatencyBucket,
    pub failure_bucket: u8,
}

impl StateKey {
    #[must_use]
    pub fn from_state(state: &CanonicalState) -> Self {
        Self {
            health_band: state.health_band,
            latency_bucket: state.latency_bucket,
            failure_bucket: failure_bucket(state.recent_failures),
        }
    }
}

/// `min(failures / 5, 3)`.
#[must_use]
pub fn failure_bucket(recent_failures: u64) -> u8 {
    let bucket = recent_failures / FAILURE_BUCKET_WIDTH;
    u8::try_from(bucket.min(u64::from(MAX_FAILURE_BUCKET))).unwrap_or(MAX_FAILURE_BUCKET)
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.health_band, self.latency_bucket, self.failure_bucket
        )
    }
}

impl FromStr for StateKey {
    type Err = BridgeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidStateKey {
            value: raw.to_string(),
        };
        let mut parts = raw.splitn(3, '_');
        let health_band = parts
            .next()
            .and_then(HealthBand::from_literal)
            .ok_or_else(invalid)?;
        let latency_bucket = parts
            .next()
            .and_then(LatencyBucket::from_literal)
            .ok_or_else(invalid)?;
        let failure_bucket = parts
            .next()
            .and_then(|b| b.parse::<u8>().ok())
            .filter(|b| *b <= MAX_FAILURE_BUCKET)
            .ok_or_else(invalid)?;
        Ok(Self {
            health_band,
            latency_bucket,
            failure_bucket,
        })
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
