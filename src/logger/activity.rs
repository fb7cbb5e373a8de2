//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Every other component sends
//! [`BridgeEvent`]s through a bounded crossbeam channel with `try_send()`, so
//! decisions are never blocked by logging back-pressure. Dropped events are
//! counted and reported in the log once the channel drains.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{BridgeError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── events ────────────────────

/// Everything the bridge reports to the activity log.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    BridgeStarted {
        version: String,
        config_hash: String,
    },
    BridgeStopped {
        reason: String,
    },
    ContractRejected {
        code: String,
        message: String,
        payload: String,
    },
    StateConverted {
        before: String,
        after: Option<String>,
    },
    ActionBlocked {
        reason: String,
        details: Option<String>,
    },
    PolicyChose {
        app_id: String,
        state_key: String,
        action: String,
        value: Option<f64>,
        explored: bool,
    },
    PolicyFallback {
        app_id: String,
        state_key: String,
        reason: String,
        action: String,
    },
    SafetyDowngrade {
        app_id: String,
        env: String,
        original_action: String,
        safe_action: String,
    },
    DecisionIssued {
        app_id: String,
        env: String,
        action: String,
        confidence: f64,
    },
    FeedbackApplied {
        state_key: String,
        action: String,
        reward: f64,
        success: bool,
    },
    FeedbackRejected {
        action: String,
        reason: String,
    },
    QValueUpdated {
        state_key: String,
        action: String,
        reward: f64,
        old_value: f64,
        new_value: f64,
    },
    SnapshotLoaded {
        path: String,
        states: usize,
    },
    SnapshotFresh {
        path: String,
    },
    SnapshotDiscarded {
        path: String,
        error_code: String,
        error_message: String,
    },
    SnapshotSaved {
        path: String,
        states: usize,
        attempts: u32,
    },
    SnapshotFailed {
        path: String,
        error_code: String,
        error_message: String,
        attempts: u32,
    },
    Error {
        code: String,
        message: String,
    },
    /// Stops the logger thread.
    Shutdown,
}

// ──────────────────── handle ────────────────────

/// Drop accounting shared between handles and the logger thread.
#[derive(Default)]
struct DropCounters {
    /// Drops not yet written to the log as a warning.
    unreported: AtomicU64,
    /// Lifetime total; never reset.
    total: AtomicU64,
}

impl DropCounters {
    fn record(&self) {
        self.unreported.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn take_unreported(&self) -> u64 {
        self.unreported.swap(0, Ordering::Relaxed)
    }
}

/// Cheaply cloneable sender side of the activity log.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<BridgeEvent>,
    drops: Arc<DropCounters>,
}

impl ActivityLoggerHandle {
    /// Queue an event. Never blocks; a full channel drops the event.
    pub fn send(&self, event: BridgeEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.drops.record();
        }
    }

    /// Events lost to back-pressure over the handle's lifetime.
    pub fn dropped_events(&self) -> u64 {
        self.drops.total.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(BridgeEvent::Shutdown);
    }

    /// Handle whose events go to the returned receiver instead of a thread.
    /// Lets tests and embedders observe the event stream directly.
    #[must_use]
    pub fn detached(capacity: usize) -> (Self, Receiver<BridgeEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                drops: Arc::new(DropCounters::default()),
            },
            rx,
        )
    }
}

// ──────────────────── spawn ────────────────────

/// Start the logger thread writing to the configured JSONL file.
pub fn spawn_logger(
    config: &LoggingConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<BridgeEvent>(config.channel_capacity.max(1));
    let drops = Arc::new(DropCounters::default());
    let handle = ActivityLoggerHandle {
        tx,
        drops: Arc::clone(&drops),
    };

    let jsonl = JsonlConfig::from(config);
    let join = thread::Builder::new()
        .name("sdb-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &drops))
        .map_err(|e| BridgeError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<BridgeEvent>, config: JsonlConfig, drops: &DropCounters) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = drops.take_unreported();
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == BridgeEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn to_log_entry(event: &BridgeEvent) -> LogEntry {
    match event {
        BridgeEvent::BridgeStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::BridgeStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        BridgeEvent::BridgeStopped { reason } => {
            let mut e = LogEntry::new(EventType::BridgeStop, Severity::Info);
            e.details = Some(reason.clone());
            e.ok = Some(true);
            e
        }
        BridgeEvent::ContractRejected {
            code,
            message,
            payload,
        } => {
            let mut e = LogEntry::new(EventType::ContractRejected, Severity::Warning);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.details = Some(payload.clone());
            e.action = Some("NOOP".to_string());
            e.ok = Some(false);
            e
        }
        BridgeEvent::StateConverted { before, after } => {
            let mut e = LogEntry::new(EventType::StateConverted, Severity::Info);
            e.details = Some(format!(
                "before={before} after={}",
                after.as_deref().unwrap_or("null")
            ));
            e.ok = Some(after.is_some());
            e
        }
        BridgeEvent::ActionBlocked { reason, details } => {
            let mut e = LogEntry::new(EventType::ActionBlocked, Severity::Warning);
            e.error_message = Some(reason.clone());
            e.details.clone_from(details);
            e.action = Some("NOOP".to_string());
            e.ok = Some(false);
            e
        }
        BridgeEvent::PolicyChose {
            app_id,
            state_key,
            action,
            value,
            explored,
        } => {
            let mut e = LogEntry::new(EventType::PolicyDecision, Severity::Info);
            e.app_id = Some(app_id.clone());
            e.state_key = Some(state_key.clone());
            e.action = Some(action.clone());
            e.value = *value;
            e.details = Some(if *explored { "explore" } else { "exploit" }.to_string());
            e
        }
        BridgeEvent::PolicyFallback {
            app_id,
            state_key,
            reason,
            action,
        } => {
            let mut e = LogEntry::new(EventType::PolicyFallback, Severity::Info);
            e.app_id = Some(app_id.clone());
            e.state_key = Some(state_key.clone());
            e.action = Some(action.clone());
            e.details = Some(reason.clone());
            e
        }
        BridgeEvent::SafetyDowngrade {
            app_id,
            env,
            original_action,
            safe_action,
        } => {
            let mut e = LogEntry::new(EventType::SafetyDowngrade, Severity::Warning);
            e.app_id = Some(app_id.clone());
            e.env = Some(env.clone());
            e.original_action = Some(original_action.clone());
            e.action = Some(safe_action.clone());
            e
        }
        BridgeEvent::DecisionIssued {
            app_id,
            env,
            action,
            confidence,
        } => {
            let mut e = LogEntry::new(EventType::DecisionIssued, Severity::Info);
            e.app_id = Some(app_id.clone());
            e.env = Some(env.clone());
            e.action = Some(action.clone());
            e.confidence = Some(*confidence);
            e.ok = Some(true);
            e
        }
        BridgeEvent::FeedbackApplied {
            state_key,
            action,
            reward,
            success,
        } => {
            let mut e = LogEntry::new(EventType::FeedbackApplied, Severity::Info);
            e.state_key = Some(state_key.clone());
            e.action = Some(action.clone());
            e.reward = Some(*reward);
            e.ok = Some(*success);
            e
        }
        BridgeEvent::FeedbackRejected { action, reason } => {
            let mut e = LogEntry::new(EventType::FeedbackRejected, Severity::Warning);
            e.action = Some(action.clone());
            e.error_message = Some(reason.clone());
            e.ok = Some(false);
            e
        }
        BridgeEvent::QValueUpdated {
            state_key,
            action,
            reward,
            old_value,
            new_value,
        } => {
            let mut e = LogEntry::new(EventType::QUpdate, Severity::Info);
            e.state_key = Some(state_key.clone());
            e.action = Some(action.clone());
            e.reward = Some(*reward);
            e.value = Some(*new_value);
            e.details = Some(format!("old={old_value}"));
            e
        }
        BridgeEvent::SnapshotLoaded { path, states } => {
            let mut e = LogEntry::new(EventType::SnapshotLoad, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("restored states={states}"));
            e.ok = Some(true);
            e
        }
        BridgeEvent::SnapshotFresh { path } => {
            let mut e = LogEntry::new(EventType::SnapshotLoad, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some("no snapshot, starting empty".to_string());
            e.ok = Some(true);
            e
        }
        BridgeEvent::SnapshotDiscarded {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::SnapshotLoad, Severity::Warning);
            e.path = Some(path.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.details = Some("snapshot discarded, starting empty".to_string());
            e.ok = Some(false);
            e
        }
        BridgeEvent::SnapshotSaved {
            path,
            states,
            attempts,
        } => {
            let mut e = LogEntry::new(EventType::SnapshotSave, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("states={states} attempts={attempts}"));
            e.ok = Some(true);
            e
        }
        BridgeEvent::SnapshotFailed {
            path,
            error_code,
            error_message,
            attempts,
        } => {
            let mut e = LogEntry::new(EventType::SnapshotSave, Severity::Critical);
            e.path = Some(path.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.details = Some(format!("attempts={attempts}"));
            e.ok = Some(false);
            e
        }
        BridgeEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        // Handled by the thread loop before conversion.
        BridgeEvent::Shutdown => LogEntry::new(EventType::BridgeStop, Severity::Info),
    }
}
