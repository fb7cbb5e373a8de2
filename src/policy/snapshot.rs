//! On-disk policy snapshot.
//!
//! A single pretty-printed JSON document holding the learned table, reward
//! weights and learning parameters. Writes go through a temp file and an
//! atomic rename so a crash never leaves a half-written snapshot behind.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BridgeError, Result};
use crate::policy::agent::PolicyParameters;
use crate::policy::reward::RewardWeights;
use crate::policy::table::QTable;

/// Serialized form of a learned policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// State key → action → estimate.
    pub q_table: QTable,
    /// Weights the table was trained with.
    pub reward_weights: RewardWeights,
    /// α, γ, ε at capture time.
    pub parameters: PolicyParameters,
    /// RFC 3339 capture time.
    pub last_updated: String,
    /// Row count at capture time (informational; recomputed on load).
    pub total_states_learned: usize,
    /// Number of updates applied over the policy's lifetime.
    #[serde(default)]
    pub total_experiences: u64,
    /// Capture counter, increasing over the policy's lifetime. The writer
    /// never replaces a snapshot with one of a lower sequence.
    #[serde(default)]
    pub sequence: u64,
}

impl PolicySnapshot {
    /// Read a snapshot.
    ///
    /// Returns `Ok(None)` when no file exists. Unreadable files are
    /// [`BridgeError::Io`]; unparseable or out-of-range contents are
    /// [`BridgeError::SnapshotCorrupt`].
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BridgeError::io(path, e)),
        };

        let mut snapshot: Self =
            serde_json::from_str(&raw).map_err(|e| BridgeError::SnapshotCorrupt {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;

        snapshot
            .check()
            .map_err(|details| BridgeError::SnapshotCorrupt {
                path: path.to_path_buf(),
                details,
            })?;

        snapshot.total_states_learned = snapshot.q_table.len();
        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically, creating parent directories.
    pub fn store_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BridgeError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");

        let result = (|| {
            {
                let mut opts = OpenOptions::new();
                opts.write(true).create(true).truncate(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt as _;
                    opts.mode(0o644);
                }
                let mut file = opts.open(&tmp_path)?;
                file.write_all(json.as_bytes())?;
                file.sync_all()?;
            }
            fs::rename(&tmp_path, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(BridgeError::io(path, e));
        }
        Ok(())
    }

    /// Range checks applied before a loaded snapshot may replace live state.
    pub fn check(&self) -> std::result::Result<(), String> {
        self.parameters.check()?;

        if let Some((name, value)) = self
            .reward_weights
            .entries()
            .into_iter()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(format!("reward weight {name} is not finite: {value}"));
        }

        if let Some((key, _)) = self.q_table.iter().find(|(_, row)| row.has_non_finite()) {
            return Err(format!("non-finite estimate in row {key}"));
        }

        Ok(())
    }
}
