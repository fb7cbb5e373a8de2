//! SDB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Top-level error type for the Safe Decision Bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("[SDB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SDB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SDB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SDB-2001] unknown action type: {value:?}")]
    UnknownAction { value: String },

    #[error("[SDB-2002] invalid state key: {value:?}")]
    InvalidStateKey { value: String },

    #[error("[SDB-2201] non-finite reward {value} for {state_key}/{action}")]
    NonFiniteReward {
        state_key: String,
        action: String,
        value: f64,
    },

    #[error("[SDB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SDB-2102] corrupt policy snapshot at {path}: {details}")]
    SnapshotCorrupt { path: PathBuf, details: String },

    #[error("[SDB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SDB-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SDB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl BridgeError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SDB-1001",
            Self::MissingConfig { .. } => "SDB-1002",
            Self::ConfigParse { .. } => "SDB-1003",
            Self::UnknownAction { .. } => "SDB-2001",
            Self::InvalidStateKey { .. } => "SDB-2002",
            Self::NonFiniteReward { .. } => "SDB-2201",
            Self::Serialization { .. } => "SDB-2101",
            Self::SnapshotCorrupt { .. } => "SDB-2102",
            Self::Io { .. } => "SDB-3002",
            Self::ChannelClosed { .. } => "SDB-3003",
            Self::Runtime { .. } => "SDB-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<BridgeError> {
        vec![
            BridgeError::InvalidConfig {
                details: String::new(),
            },
            BridgeError::MissingConfig {
                path: PathBuf::new(),
            },
            BridgeError::ConfigParse {
                context: "",
                details: String::new(),
            },
            BridgeError::UnknownAction {
                value: String::new(),
            },
            BridgeError::InvalidStateKey {
                value: String::new(),
            },
            BridgeError::NonFiniteReward {
                state_key: String::new(),
                action: String::new(),
                value: f64::NAN,
            },
            BridgeError::Serialization {
                context: "",
                details: String::new(),
            },
            BridgeError::SnapshotCorrupt {
                path: PathBuf::new(),
                details: String::new(),
            },
            BridgeError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            BridgeError::ChannelClosed { component: "" },
            BridgeError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(BridgeError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_sdb_prefix_and_appear_in_display() {
        for err in all_variants() {
            assert!(err.code().starts_with("SDB-"), "bad code {}", err.code());
            assert!(
                err.to_string().contains(err.code()),
                "display should contain code: {err}"
            );
        }
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(BridgeError::io("/tmp/x", std::io::Error::other("busy")).is_retryable());
        assert!(BridgeError::ChannelClosed { component: "writer" }.is_retryable());
        assert!(
            !BridgeError::SnapshotCorrupt {
                path: PathBuf::new(),
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !BridgeError::UnknownAction {
                value: "JUMP".to_string()
            }
            .is_retryable()
        );
        assert!(
            !BridgeError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = BridgeError::io(
            "/tmp/policy.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "SDB-3002");
        assert!(err.to_string().contains("/tmp/policy.json"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BridgeError = json_err.into();
        assert_eq!(err.code(), "SDB-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: BridgeError = toml_err.into();
        assert_eq!(err.code(), "SDB-1003");
    }
}
