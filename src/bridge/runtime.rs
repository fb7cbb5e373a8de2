//! Wiring: logger thread, snapshot writer thread, policy and bridge.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::bridge::service::DecisionBridge;
use crate::core::config::Config;
use crate::core::errors::{BridgeError, Result};
use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent, spawn_logger};
use crate::policy::agent::{ActionPolicy, QLearningPolicy, SnapshotLoadOutcome};
use crate::policy::persist::{SnapshotWriterHandle, spawn_snapshot_writer};
use crate::state::adapter::StateAdapter;

/// A running bridge plus the background threads it depends on.
///
/// Call [`BridgeRuntime::shutdown`] to write a final snapshot and join the
/// threads.
pub struct BridgeRuntime {
    bridge: Arc<DecisionBridge>,
    policy: Arc<QLearningPolicy>,
    logger: Option<(ActivityLoggerHandle, JoinHandle<()>)>,
    writer: Option<(SnapshotWriterHandle, JoinHandle<()>)>,
    load_outcome: Option<SnapshotLoadOutcome>,
}

impl BridgeRuntime {
    /// Validate `config`, start the enabled background threads, restore the
    /// snapshot when configured, and build the bridge.
    pub fn start(config: &Config) -> Result<Self> {
        config.validate()?;

        let logger = if config.logging.enabled {
            Some(spawn_logger(&config.logging)?)
        } else {
            None
        };
        let logger_handle = logger.as_ref().map(|(handle, _)| handle.clone());

        let writer = if config.persistence.enabled {
            Some(spawn_snapshot_writer(
                config.persistence.writer_config(),
                logger_handle.clone(),
            )?)
        } else {
            None
        };

        let mut policy = QLearningPolicy::from_config(config)?;
        if let Some(handle) = &logger_handle {
            policy = policy.with_logger(handle.clone());
        }
        if let Some((handle, _)) = &writer {
            policy = policy.with_snapshot_writer(handle.clone());
        }

        let load_outcome = (config.persistence.enabled && config.persistence.load_on_start)
            .then(|| policy.load_snapshot(&config.persistence.snapshot_path));

        let policy = Arc::new(policy);
        let shared: Arc<dyn ActionPolicy> = policy.clone();
        let mut bridge = DecisionBridge::new(shared);
        if let Some(handle) = &logger_handle {
            bridge = bridge.with_logger(handle.clone());
        }
        let bridge = bridge.with_adapter(StateAdapter::new(config.adapter.clone()));

        if let Some(handle) = &logger_handle {
            handle.send(BridgeEvent::BridgeStarted {
                version: env!("CARGO_PKG_VERSION").to_string(),
                config_hash: config.stable_hash()?,
            });
        }

        Ok(Self {
            bridge: Arc::new(bridge),
            policy,
            logger,
            writer,
            load_outcome,
        })
    }

    /// Shared bridge handle.
    #[must_use]
    pub fn bridge(&self) -> Arc<DecisionBridge> {
        Arc::clone(&self.bridge)
    }

    /// Concrete policy, for snapshot control.
    #[must_use]
    pub fn policy(&self) -> Arc<QLearningPolicy> {
        Arc::clone(&self.policy)
    }

    /// What happened to the on-disk snapshot at start, if loading ran.
    #[must_use]
    pub fn snapshot_load_outcome(&self) -> Option<&SnapshotLoadOutcome> {
        self.load_outcome.as_ref()
    }

    /// Lifetime count of activity events dropped under back-pressure.
    #[must_use]
    pub fn dropped_log_events(&self) -> u64 {
        self.logger
            .as_ref()
            .map_or(0, |(handle, _)| handle.dropped_events())
    }

    /// Synchronously persist the current policy.
    pub fn flush(&self) -> Result<()> {
        self.policy.flush()
    }

    /// Write a final snapshot, then stop and join both threads.
    ///
    /// The threads are joined even when the final write fails; that error is
    /// returned afterwards.
    pub fn shutdown(self) -> Result<()> {
        let flushed = if self.writer.is_some() {
            self.policy.flush()
        } else {
            Ok(())
        };

        if let Some((handle, join)) = self.writer {
            handle.shutdown();
            join_thread(join, "snapshot-writer")?;
        }

        if let Some((handle, join)) = self.logger {
            handle.send(BridgeEvent::BridgeStopped {
                reason: "shutdown".to_string(),
            });
            handle.shutdown();
            join_thread(join, "logger")?;
        }

        flushed
    }
}

fn join_thread(join: JoinHandle<()>, name: &str) -> Result<()> {
    join.join().map_err(|_| BridgeError::Runtime {
        details: format!("{name} thread panicked"),
    })
}
