//! Background snapshot writer.
//!
//! A dedicated thread owns the snapshot file. The policy hands it cloned
//! snapshots over a bounded crossbeam channel with `try_send()`, so the
//! decision path never waits on disk IO. Queued snapshots are coalesced and
//! only the newest one is written. Snapshots can reach the queue out of
//! capture order, so "newest" means highest `sequence`, and anything older
//! than the last written snapshot is skipped.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{BridgeError, Result};
use crate::logger::activity::{ActivityLoggerHandle, BridgeEvent};
use crate::policy::snapshot::PolicySnapshot;

// ──────────────────── configuration ────────────────────

/// Options for the writer thread.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub path: PathBuf,
    pub max_write_attempts: u32,
    pub retry_backoff: Duration,
    pub channel_capacity: usize,
}

// ──────────────────── commands ────────────────────

enum WriterCommand {
    Write(Box<PolicySnapshot>),
    WriteAndAck(Box<PolicySnapshot>, Sender<Result<()>>),
    Shutdown,
}

#[derive(Default)]
struct WriterStats {
    dropped: AtomicU64,
    coalesced: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
}

// ──────────────────── public handle ────────────────────

/// Cloneable handle to the writer thread.
#[derive(Clone)]
pub struct SnapshotWriterHandle {
    tx: Sender<WriterCommand>,
    stats: Arc<WriterStats>,
    path: PathBuf,
}

impl SnapshotWriterHandle {
    /// Queue a snapshot. Non-blocking; a full queue drops the snapshot.
    pub fn submit(&self, snapshot: PolicySnapshot) {
        let command = WriterCommand::Write(Box::new(snapshot));
        if let Err(TrySendError::Full(_)) = self.tx.try_send(command) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Write `snapshot` and wait until the writer reports the outcome.
    pub fn write_sync(&self, snapshot: PolicySnapshot) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.tx
            .send(WriterCommand::WriteAndAck(Box::new(snapshot), ack_tx))
            .map_err(|_| BridgeError::ChannelClosed {
                component: "snapshot-writer",
            })?;
        ack_rx.recv().map_err(|_| BridgeError::ChannelClosed {
            component: "snapshot-writer",
        })?
    }

    /// Ask the thread to finish queued work and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown);
    }

    /// Destination file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Snapshots dropped because the queue was full.
    pub fn dropped_snapshots(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Snapshots superseded by a newer one before being written.
    pub fn coalesced_snapshots(&self) -> u64 {
        self.stats.coalesced.load(Ordering::Relaxed)
    }

    /// Successful writes.
    pub fn written_snapshots(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    /// Writes that failed after every retry.
    pub fn failed_snapshots(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Snapshots skipped because a newer one was already on disk.
    pub fn stale_snapshots(&self) -> u64 {
        self.stats.stale.load(Ordering::Relaxed)
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the writer thread.
pub fn spawn_snapshot_writer(
    config: WriterConfig,
    logger: Option<ActivityLoggerHandle>,
) -> Result<(SnapshotWriterHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<WriterCommand>(config.channel_capacity.max(1));
    let stats = Arc::new(WriterStats::default());

    let handle = SnapshotWriterHandle {
        tx,
        stats: Arc::clone(&stats),
        path: config.path.clone(),
    };

    let join = thread::Builder::new()
        .name("sdb-snapshot".to_string())
        .spawn(move || writer_thread_main(&rx, &config, &stats, logger.as_ref()))
        .map_err(|e| BridgeError::Runtime {
            details: format!("failed to spawn snapshot writer thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── writer thread ────────────────────

fn writer_thread_main(
    rx: &Receiver<WriterCommand>,
    config: &WriterConfig,
    stats: &WriterStats,
    logger: Option<&ActivityLoggerHandle>,
) {
    let mut pending: Option<WriterCommand> = None;
    let mut last_written: Option<u64> = None;

    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            WriterCommand::Write(mut snapshot) => {
                loop {
                    match rx.try_recv() {
                        Ok(WriterCommand::Write(other)) => {
                            stats.coalesced.fetch_add(1, Ordering::Relaxed);
                            if other.sequence >= snapshot.sequence {
                                snapshot = other;
                            }
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                if is_stale(&snapshot, last_written) {
                    stats.stale.fetch_add(1, Ordering::Relaxed);
                } else if write_with_retry(&snapshot, config, stats, logger).is_ok() {
                    last_written = Some(snapshot.sequence);
                }
            }
            WriterCommand::WriteAndAck(snapshot, ack) => {
                // A stale synchronous request is already covered by what is on disk.
                let result = if is_stale(&snapshot, last_written) {
                    stats.stale.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                } else {
                    let result = write_with_retry(&snapshot, config, stats, logger);
                    if result.is_ok() {
                        last_written = Some(snapshot.sequence);
                    }
                    result
                };
                let _ = ack.send(result);
            }
            WriterCommand::Shutdown => break,
        }
    }
}

fn is_stale(snapshot: &PolicySnapshot, last_written: Option<u64>) -> bool {
    last_written.is_some_and(|written| snapshot.sequence < written)
}

fn write_with_retry(
    snapshot: &PolicySnapshot,
    config: &WriterConfig,
    stats: &WriterStats,
    logger: Option<&ActivityLoggerHandle>,
) -> Result<()> {
    let max_attempts = config.max_write_attempts.max(1);
    let mut backoff = config.retry_backoff;
    let mut attempt = 1;

    loop {
        match snapshot.store_atomic(&config.path) {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                if let Some(logger) = logger {
                    logger.send(BridgeEvent::SnapshotSaved {
                        path: config.path.display().to_string(),
                        states: snapshot.q_table.len(),
                        attempts: attempt,
                    });
                }
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                match logger {
                    Some(logger) => logger.send(BridgeEvent::SnapshotFailed {
                        path: config.path.display().to_string(),
                        error_code: e.code().to_string(),
                        error_message: e.to_string(),
                        attempts: attempt,
                    }),
                    None => eprintln!("[SDB-SNAPSHOT] {e} (after {attempt} attempt(s))"),
                }
                return Err(e);
            }
        }
    }
}
