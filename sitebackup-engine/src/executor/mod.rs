//! Backup job executor - runs one admitted job from connect to archive.
//!
//! A job moves through `Connecting -> Syncing -> Archiving` and ends in
//! exactly one terminal phase. The remote source is closed on every exit path
//! and the run ticket is consumed with the outcome, so the method is free for
//! the next run whatever happens here. Everything in this module blocks; the
//! service calls [`BackupJob::run`] from a blocking thread.

pub mod archive;

use crate::jobs::{JobPhase, RunTicket};
use crate::method::Method;
use crate::monitor::LogBuffer;
use crate::notify::{self, ArchiveRecord, ArchiveStore, Delivery, Notifier};
use crate::remote::{ConnectionGuard, Connector, Handshake, RemoteConfig};
use crate::sync::{sync_tree, SyncObserver, SyncTotals};
use crate::utils::errors::EngineError;
use archive::{ArchiveBuilder, BuiltArchive};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROGRESS_CONNECTING: u8 = 10;
pub const PROGRESS_SYNCING: u8 = 30;
pub const PROGRESS_SYNC_CEILING: u8 = 85;
pub const PROGRESS_ARCHIVING: u8 = 90;

/// Where staged files and finished archives live.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Timezone archive names are stamped in.
    pub timezone: Tz,
}

impl StorageLayout {
    pub fn staging_dir(&self, method: Method) -> PathBuf {
        self.data_dir.join(method.staging_dir_name())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded {
        archive: BuiltArchive,
        totals: SyncTotals,
    },
    Stopped {
        totals: SyncTotals,
    },
    ConfigFailed(String),
    ConnectionFailed(String),
    NothingToArchive,
    ArchiveFailed(String),
}

impl JobOutcome {
    pub fn phase(&self) -> JobPhase {
        match self {
            JobOutcome::Succeeded { .. } => JobPhase::Succeeded,
            JobOutcome::Stopped { .. } => JobPhase::Stopped,
            JobOutcome::ConfigFailed(_) => JobPhase::ConfigFailed,
            JobOutcome::ConnectionFailed(_) => JobPhase::ConnectionFailed,
            JobOutcome::NothingToArchive => JobPhase::NothingToArchive,
            JobOutcome::ArchiveFailed(_) => JobPhase::ArchiveFailed,
        }
    }

    /// Text shown as the method's last result.
    pub fn summary(&self) -> String {
        match self {
            JobOutcome::Succeeded { archive, .. } => format!("Success: {}", archive.filename),
            JobOutcome::Stopped { .. } => "Stopped by user".to_string(),
            JobOutcome::ConfigFailed(e)
            | JobOutcome::ConnectionFailed(e)
            | JobOutcome::ArchiveFailed(e) => format!("Failed: {}", e),
            JobOutcome::NothingToArchive => "Failed: no files to archive".to_string(),
        }
    }
}

/// Collaborators of a run, borrowed from the engine.
pub struct BackupJob<'a> {
    pub logs: &'a LogBuffer,
    pub notifier: &'a dyn Notifier,
    pub archives: &'a dyn ArchiveStore,
    pub connector: &'a dyn Connector,
    pub layout: &'a StorageLayout,
}

impl BackupJob<'_> {
    pub fn run(&self, ticket: RunTicket, config: &RemoteConfig) -> JobOutcome {
        let method = ticket.method();
        let outcome = self.execute(&ticket, config);
        info!(method = %method, phase = ?outcome.phase(), "Backup job finished");
        ticket.finish(outcome.phase(), outcome.summary());
        outcome
    }

    fn execute(&self, ticket: &RunTicket, config: &RemoteConfig) -> JobOutcome {
        let method = ticket.method();
        self.log(method, "Starting backup process...");

        if !config.has_host() {
            let e = EngineError::Config(format!("no host configured for {}", method.label()));
            self.log(method, format!("Not started: {}", e));
            return JobOutcome::ConfigFailed(e.to_string());
        }

        ticket.advance(JobPhase::Connecting, PROGRESS_CONNECTING);
        self.log(method, format!("Connecting to {}...", config.host));

        let staging = self.layout.staging_dir(method);
        let (totals, cancelled) = {
            let mut guard = ConnectionGuard::new(self.connector.open(method, config));

            let handshake = match guard
                .source()
                .connect()
                .and_then(|h| std::fs::create_dir_all(&staging).map(|_| h).map_err(Into::into))
            {
                Ok(handshake) => handshake,
                Err(e) => {
                    self.log(method, format!("Critical connection error: {}", e));
                    self.send(method, &notify::failure_subject(method), &notify::failure_body(&e.to_string()));
                    return JobOutcome::ConnectionFailed(e.to_string());
                }
            };

            ticket.advance(JobPhase::Syncing, PROGRESS_SYNCING);
            let totals = match handshake {
                Handshake::Tree => {
                    self.log(method, "Starting file download...");
                    let mut observer = JobObserver {
                        logs: self.logs,
                        ticket,
                    };
                    sync_tree(
                        guard.source(),
                        config.root(),
                        &staging,
                        ticket.cancel_token(),
                        &mut observer,
                    )
                }
                Handshake::Probe {
                    marker_name,
                    contents,
                } => self.write_marker(method, &staging, &marker_name, &contents),
            };

            (totals, ticket.is_cancelled())
        };

        if cancelled {
            self.log(method, "Process stopped by user.");
            return JobOutcome::Stopped { totals };
        }

        ticket.advance(JobPhase::Archiving, PROGRESS_ARCHIVING);
        self.log(method, "Creating timestamped archive...");
        let started = self.layout.timezone.from_utc_datetime(&Utc::now().naive_utc());

        match ArchiveBuilder::new(&self.layout.archive_dir).build(method, &staging, started.naive_local()) {
            Ok(archive) => {
                self.log(method, format!("Archive created: {}", archive.filename));
                self.record(method, &archive, &totals);
                self.send(
                    method,
                    &notify::success_subject(method),
                    &notify::success_body(&archive.filename, totals.files_count, totals.total_bytes),
                );
                JobOutcome::Succeeded { archive, totals }
            }
            Err(e) if e.is_nothing_to_archive() => {
                self.log(method, "Error: No files to archive.");
                JobOutcome::NothingToArchive
            }
            Err(e) => {
                self.log(method, format!("Archiving failed: {}", e));
                JobOutcome::ArchiveFailed(e.to_string())
            }
        }
    }

    fn write_marker(&self, method: Method, staging: &Path, name: &str, contents: &str) -> SyncTotals {
        match std::fs::write(staging.join(name), contents) {
            Ok(()) => {
                self.log(method, format!("Probe recorded: {}", name));
                SyncTotals {
                    files_count: 1,
                    total_bytes: contents.len() as u64,
                }
            }
            Err(e) => {
                self.log(method, format!("FAILED {}: {}", name, e));
                SyncTotals::default()
            }
        }
    }

    fn record(&self, method: Method, archive: &BuiltArchive, totals: &SyncTotals) {
        let record = ArchiveRecord {
            filename: archive.filename.clone(),
            size_bytes: totals.total_bytes,
            status: notify::STATUS_SUCCESS.to_string(),
            timestamp: Utc::now(),
            method,
        };
        if let Err(e) = self.archives.record(&record) {
            warn!(method = %method, error = %e, "Failed to record archive");
            self.log(method, format!("Failed to record archive: {}", e));
        }
    }

    fn send(&self, method: Method, subject: &str, body: &str) {
        match self.notifier.notify(subject, body) {
            Ok(Delivery::Sent) => info!(method = %method, subject, "Notification sent"),
            Ok(Delivery::Skipped) => self.log(method, "Notification skipped: No SMTP config."),
            Err(e) => self.log(method, format!("Failed to send email: {}", e)),
        }
    }

    fn log(&self, method: Method, message: impl AsRef<str>) {
        self.logs.append(format!("[{}] {}", method.label(), message.as_ref()));
    }
}

/// Feeds walk progress into the log and the method's progress bar.
struct JobObserver<'a> {
    logs: &'a LogBuffer,
    ticket: &'a RunTicket,
}

impl SyncObserver for JobObserver<'_> {
    fn on_file(&mut self, path: &str, _bytes: u64, totals: &SyncTotals) {
        let label = self.ticket.method().label();
        self.logs.append(format!("[{}] Downloaded: {}", label, path));
        let span = u64::from(PROGRESS_SYNC_CEILING - PROGRESS_SYNCING);
        let progress = PROGRESS_SYNCING as u64 + totals.files_count.min(span);
        self.ticket.set_progress(progress as u8);
    }

    fn on_error(&mut self, path: &str, error: &EngineError) {
        let label = self.ticket.method().label();
        let message = match error {
            EngineError::Listing { message, .. } => format!("Skipping folder {}: {}", path, message),
            EngineError::Fetch { message, .. } => format!("FAILED {}: {}", path, message),
            other => format!("FAILED {}: {}", path, other),
        };
        self.logs.append(format!("[{}] {}", label, message));
    }
}
