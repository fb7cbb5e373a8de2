//! Configuration: TOML file, then `SDB_*` environment overrides, then
//! validation.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BridgeError, Result};
use crate::policy::agent::{PolicyParameters, SnapshotTriggers};
use crate::policy::persist::WriterConfig;
use crate::policy::reward::RewardWeights;

/// Full bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub policy: PolicyConfig,
    pub rewards: RewardWeights,
    pub adapter: AdapterConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Learning parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
    /// Fixed exploration seed; OS entropy when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Thresholds used when bucketing raw telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Latency strictly below this is `low`.
    pub latency_low_below_ms: f64,
    /// Latency strictly below this (and not `low`) is `medium`.
    pub latency_medium_below_ms: f64,
    /// Error counts up to this derive `healthy` when `state` is unusable.
    pub healthy_max_errors: u64,
    /// Error counts up to this derive `degraded`; above is `failing`.
    pub degraded_max_errors: u64,
}

/// Snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub snapshot_path: PathBuf,
    /// Restore the snapshot when the runtime starts.
    pub load_on_start: bool,
    /// Schedule a write after this many newly observed states (0 = never).
    pub snapshot_every_new_states: u64,
    /// Schedule a write after this many updates (0 = never).
    pub snapshot_every_updates: u64,
    pub max_write_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_backoff_ms: u64,
    pub channel_capacity: usize,
}

/// Activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
    pub channel_capacity: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let params = PolicyParameters::default();
        Self {
            alpha: params.alpha,
            gamma: params.gamma,
            epsilon: params.epsilon,
            seed: None,
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub const fn parameters(&self) -> PolicyParameters {
        PolicyParameters {
            alpha: self.alpha,
            gamma: self.gamma,
            epsilon: self.epsilon,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            latency_low_below_ms: 200.0,
            latency_medium_below_ms: 500.0,
            healthy_max_errors: 0,
            degraded_max_errors: 5,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_path: data_dir().join("policy.json"),
            load_on_start: true,
            snapshot_every_new_states: 10,
            snapshot_every_updates: 0,
            max_write_attempts: 3,
            retry_backoff_ms: 50,
            channel_capacity: 16,
        }
    }
}

impl PersistenceConfig {
    #[must_use]
    pub const fn triggers(&self) -> SnapshotTriggers {
        SnapshotTriggers {
            every_new_states: self.snapshot_every_new_states,
            every_updates: self.snapshot_every_updates,
        }
    }

    #[must_use]
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            path: self.snapshot_path.clone(),
            max_write_attempts: self.max_write_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_path: data_dir().join("activity.jsonl"),
            fallback_path: Some(env::temp_dir().join("sdb-activity.jsonl")),
            max_size_bytes: 50 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
            channel_capacity: 1024,
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[SDB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("sdb")
}

impl Config {
    /// `$HOME/.config/sdb/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("sdb").join("config.toml")
    }

    /// Load from `path` (or the default path), apply env overrides, validate.
    ///
    /// A missing file at the default path yields defaults; a missing explicit
    /// path is [`BridgeError::MissingConfig`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| BridgeError::io(&path_buf, e))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(BridgeError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// FNV-1a hash of the effective config, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let hash = canonical
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, byte| {
                (acc ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        // policy
        if let Some(raw) = var("SDB_POLICY_ALPHA") {
            self.policy.alpha = parse_env("SDB_POLICY_ALPHA", &raw)?;
        }
        if let Some(raw) = var("SDB_POLICY_GAMMA") {
            self.policy.gamma = parse_env("SDB_POLICY_GAMMA", &raw)?;
        }
        if let Some(raw) = var("SDB_POLICY_EPSILON") {
            self.policy.epsilon = parse_env("SDB_POLICY_EPSILON", &raw)?;
        }
        if let Some(raw) = var("SDB_POLICY_SEED") {
            self.policy.seed = Some(parse_env("SDB_POLICY_SEED", &raw)?);
        }

        // adapter
        if let Some(raw) = var("SDB_ADAPTER_LATENCY_LOW_BELOW_MS") {
            self.adapter.latency_low_below_ms =
                parse_env("SDB_ADAPTER_LATENCY_LOW_BELOW_MS", &raw)?;
        }
        if let Some(raw) = var("SDB_ADAPTER_LATENCY_MEDIUM_BELOW_MS") {
            self.adapter.latency_medium_below_ms =
                parse_env("SDB_ADAPTER_LATENCY_MEDIUM_BELOW_MS", &raw)?;
        }
        if let Some(raw) = var("SDB_ADAPTER_HEALTHY_MAX_ERRORS") {
            self.adapter.healthy_max_errors = parse_env("SDB_ADAPTER_HEALTHY_MAX_ERRORS", &raw)?;
        }
        if let Some(raw) = var("SDB_ADAPTER_DEGRADED_MAX_ERRORS") {
            self.adapter.degraded_max_errors = parse_env("SDB_ADAPTER_DEGRADED_MAX_ERRORS", &raw)?;
        }

        // persistence
        if let Some(raw) = var("SDB_PERSISTENCE_ENABLED") {
            self.persistence.enabled = parse_env("SDB_PERSISTENCE_ENABLED", &raw)?;
        }
        if let Some(raw) = var("SDB_SNAPSHOT_PATH") {
            self.persistence.snapshot_path = PathBuf::from(raw);
        }
        if let Some(raw) = var("SDB_PERSISTENCE_LOAD_ON_START") {
            self.persistence.load_on_start = parse_env("SDB_PERSISTENCE_LOAD_ON_START", &raw)?;
        }

        // logging
        if let Some(raw) = var("SDB_LOGGING_ENABLED") {
            self.logging.enabled = parse_env("SDB_LOGGING_ENABLED", &raw)?;
        }
        if let Some(raw) = var("SDB_LOG_JSONL_PATH") {
            self.logging.jsonl_path = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.policy.parameters().validate()?;

        if let Some((name, value)) = self
            .rewards
            .entries()
            .into_iter()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(invalid(format!("rewards.{name} must be finite, got {value}")));
        }

        let low = self.adapter.latency_low_below_ms;
        let medium = self.adapter.latency_medium_below_ms;
        if !(low.is_finite() && medium.is_finite() && low >= 0.0) {
            return Err(invalid(format!(
                "adapter latency thresholds must be finite and non-negative, got {low}/{medium}"
            )));
        }
        if low >= medium {
            return Err(invalid(format!(
                "adapter.latency_low_below_ms ({low}) must be below \
                 latency_medium_below_ms ({medium})"
            )));
        }
        if self.adapter.healthy_max_errors > self.adapter.degraded_max_errors {
            return Err(invalid(format!(
                "adapter.healthy_max_errors ({}) must not exceed degraded_max_errors ({})",
                self.adapter.healthy_max_errors, self.adapter.degraded_max_errors
            )));
        }

        if self.persistence.enabled {
            if self.persistence.max_write_attempts == 0 {
                return Err(invalid("persistence.max_write_attempts must be >= 1"));
            }
            if self.persistence.channel_capacity == 0 {
                return Err(invalid("persistence.channel_capacity must be >= 1"));
            }
            if self.persistence.snapshot_path.as_os_str().is_empty() {
                return Err(invalid("persistence.snapshot_path must not be empty"));
            }
        }

        if self.logging.enabled {
            if self.logging.channel_capacity == 0 {
                return Err(invalid("logging.channel_capacity must be >= 1"));
            }
            if self.logging.max_size_bytes == 0 {
                return Err(invalid("logging.max_size_bytes must be >= 1"));
            }
        }

        Ok(())
    }
}

fn invalid(details: impl Into<String>) -> BridgeError {
    BridgeError::InvalidConfig {
        details: details.into(),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| BridgeError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
