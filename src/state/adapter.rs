//! Runtime → canonical state conversion.
//!
//! The adapter never fails loudly: anything it cannot interpret either falls
//! back to a safe default (latency, failure count) or yields `None` for the
//! whole conversion (identity fields). Output depends on the payload and the
//! thresholds only; no clock, no randomness.

use serde_json::Value;

use crate::core::config::AdapterConfig;
use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent};
use crate::state::canonical::{CanonicalState, Environment, HealthBand, LatencyBucket};
use crate::state::telemetry::{
    FIELD_APP, FIELD_ENV, FIELD_ERRORS_LAST_MIN, FIELD_LATENCY_MS, FIELD_STATE, RuntimeTelemetry,
};

/// Converts raw telemetry into [`CanonicalState`].
#[derive(Clone, Default)]
pub struct StateAdapter {
    config: AdapterConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl StateAdapter {
    /// Adapter with the given thresholds and no activity logging.
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            logger: None,
        }
    }

    /// Attach an activity logger for before/after conversion records.
    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Thresholds in effect.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Convert a payload, logging the before/after pair.
    ///
    /// Returns `None` when `app` or `env` is missing, blank, or unusable.
    #[must_use]
    pub fn convert(&self, payload: &RuntimeTelemetry) -> Option<CanonicalState> {
        let converted = self.convert_quiet(payload);
        self.log_conversion(payload, converted.as_ref());
        converted
    }

    /// Conversion without the activity record.
    #[must_use]
    pub fn convert_quiet(&self, payload: &RuntimeTelemetry) -> Option<CanonicalState> {
        let app_id = payload.str_field(FIELD_APP).map(str::trim)?;
        let env_raw = payload.str_field(FIELD_ENV).map(str::trim)?;
        if app_id.is_empty() || env_raw.is_empty() {
            return None;
        }
        let env = Environment::from_literal(env_raw)?;

        let recent_failures = coerce_failure_count(payload.field(FIELD_ERRORS_LAST_MIN));
        let health_band = self.health_band(payload.str_field(FIELD_STATE), recent_failures);
        let latency_bucket = self.latency_bucket(payload.field(FIELD_LATENCY_MS));

        Some(CanonicalState::from_parts(
            app_id.to_string(),
            env,
            health_band,
            latency_bucket,
            recent_failures,
        ))
    }

    /// Map the reported state 1:1, or derive a band from the error count when
    /// the state literal is unusable.
    fn health_band(&self, reported: Option<&str>, recent_failures: u64) -> HealthBand {
        if let Some(band) = reported
            .map(|s| s.trim().to_ascii_lowercase())
            .and_then(|s| HealthBand::from_literal(&s))
        {
            return band;
        }
        if recent_failures <= self.config.healthy_max_errors {
            HealthBand::Healthy
        } else if recent_failures <= self.config.degraded_max_errors {
            HealthBand::Degraded
        } else {
            HealthBand::Failing
        }
    }

    fn latency_bucket(&self, raw: Option<&Value>) -> LatencyBucket {
        let Some(latency) = raw.and_then(coerce_f64).filter(|v| v.is_finite()) else {
            return LatencyBucket::Unknown;
        };
        if latency < self.config.latency_low_below_ms {
            LatencyBucket::Low
        } else if latency < self.config.latency_medium_below_ms {
            LatencyBucket::Medium
        } else {
            LatencyBucket::High
        }
    }

    fn log_conversion(&self, before: &RuntimeTelemetry, after: Option<&CanonicalState>) {
        if let Some(logger) = &self.logger {
            logger.send(BridgeEvent::StateConverted {
                before: before.to_string(),
                after: after.and_then(|state| serde_json::to_string(state).ok()),
            });
        }
    }
}

/// Numeric value of a JSON number or numeric string.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Error count as a non-negative integer; anything unusable counts as zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coerce_failure_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                u
            } else if n.as_i64().is_some() {
                // Negative integer.
                0
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map_or(0, |f| f.trunc().max(0.0) as u64)
            }
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().map_or(0, |v| v.max(0) as u64),
        _ => 0,
    }
}
