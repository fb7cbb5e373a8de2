//! Append-only JSONL activity log.
//!
//! One JSON object per line, assembled in memory and written with a single
//! `write_all` so a tailing reader never sees a torn line. When the primary
//! file becomes unusable the writer steps down, one level at a time:
//! primary file, fallback file, stderr (`[SDB-JSONL]` prefix), then discard.
//! Logging never takes the bridge down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::config::LoggingConfig;
use crate::core::errors::{BridgeError, Result};
use crate::core::now_rfc3339;

const BUFFER_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event kinds written to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BridgeStart,
    BridgeStop,
    ContractRejected,
    StateConverted,
    ActionBlocked,
    PolicyDecision,
    PolicyFallback,
    SafetyDowngrade,
    DecisionIssued,
    FeedbackApplied,
    FeedbackRejected,
    QUpdate,
    SnapshotLoad,
    SnapshotSave,
    Error,
}

/// One log line. Everything except `ts`, `event` and `severity` is optional
/// and omitted when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Action after every adjustment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Action before a safety downgrade or fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    /// Q-value estimate involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// `SDB-xxxx` or validation code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Snapshot path for persistence events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Empty entry stamped with the current time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: now_rfc3339(),
            event,
            severity,
            app_id: None,
            env: None,
            action: None,
            original_action: None,
            state_key: None,
            reward: None,
            value: None,
            confidence: None,
            ok: None,
            error_code: None,
            error_message: None,
            path: None,
            details: None,
        }
    }
}

/// Writer options.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would exceed this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`activity.jsonl.1` … `.N`).
    pub max_rotated_files: u32,
    pub fsync_interval: Duration,
}

impl From<&LoggingConfig> for JsonlConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            path: config.jsonl_path.clone(),
            fallback_path: config.fallback_path.clone(),
            max_size_bytes: config.max_size_bytes,
            max_rotated_files: config.max_rotated_files,
            fsync_interval: Duration::from_secs(config.fsync_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl Sink {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

/// JSONL writer with size-based rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the primary file, stepping down the chain as needed.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        if !writer.attach(Sink::Primary) {
            writer.step_down_from(Sink::Primary);
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SDB-JSONL] cannot serialize entry: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        self.sink.as_str()
    }

    /// Size of the active file.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Reattach to the primary file after a degradation, when possible.
    pub fn try_recover(&mut self) {
        if self.sink != Sink::Primary && self.attach(Sink::Primary) {
            let _ = writeln!(
                io::stderr(),
                "[SDB-JSONL] recovered primary log {}",
                self.config.path.display()
            );
        }
    }

    // ──────────────────── internals ────────────────────

    fn write_line(&mut self, line: &str) {
        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    let len = line.len() as u64;
                    if self.bytes_written > 0
                        && self.bytes_written + len > self.config.max_size_bytes
                    {
                        self.rotate();
                        continue;
                    }
                    let written = self
                        .file
                        .as_mut()
                        .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                    if written {
                        self.bytes_written += len;
                        if self.last_fsync.elapsed() >= self.config.fsync_interval {
                            self.fsync();
                        }
                        return;
                    }
                    self.step_down_from(self.sink);
                }
                Sink::Stderr => {
                    let _ = write!(io::stderr(), "[SDB-JSONL] {line}");
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    fn path_for(&self, sink: Sink) -> Option<&Path> {
        match sink {
            Sink::Primary => Some(&self.config.path),
            Sink::Fallback => self.config.fallback_path.as_deref(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    fn attach(&mut self, sink: Sink) -> bool {
        let Some(path) = self.path_for(sink) else {
            return false;
        };
        match open_append(path) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::with_capacity(BUFFER_CAPACITY, file));
                self.sink = sink;
                self.bytes_written = size;
                true
            }
            Err(_) => false,
        }
    }

    fn step_down_from(&mut self, failed: Sink) {
        self.file = None;
        let next = match failed {
            Sink::Primary if self.attach(Sink::Fallback) => Sink::Fallback,
            Sink::Primary | Sink::Fallback => Sink::Stderr,
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
        if next != Sink::Discard {
            let _ = writeln!(
                io::stderr(),
                "[SDB-JSONL] {} log unusable, switching to {}",
                failed.as_str(),
                next.as_str()
            );
        }
        self.sink = next;
    }

    fn rotate(&mut self) {
        self.flush();
        self.file = None;
        let sink = self.sink;
        let Some(base) = self.path_for(sink).map(Path::to_path_buf) else {
            return;
        };

        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for generation in (1..keep).rev() {
                let _ = fs::rename(
                    rotated_name(&base, generation),
                    rotated_name(&base, generation + 1),
                );
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        if !self.attach(sink) {
            self.step_down_from(sink);
        }
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BridgeError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BridgeError::io(path, e))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.3`.
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}
