//! Per-method job state and admission control.
//!
//! One [`JobState`] exists for each method for the life of the process. A run
//! is admitted by [`JobBoard::try_start`], which hands out the only
//! [`RunTicket`] for that method until the run finishes. Finishing consumes
//! the ticket; a ticket dropped without finishing (a panicking job, an aborted
//! task) finishes the run as [`JobPhase::Aborted`], so `running` can never stay
//! stuck at `true`.

use crate::events::EngineEvent;
use crate::method::Method;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Idle,
    Connecting,
    Syncing,
    Archiving,
    Succeeded,
    Stopped,
    ConnectionFailed,
    ConfigFailed,
    ArchiveFailed,
    NothingToArchive,
    Aborted,
}

#[derive(Debug)]
struct JobState {
    running: bool,
    progress: u8,
    last_result: String,
    phase: JobPhase,
    cancel: CancellationToken,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    fn idle() -> Self {
        Self {
            running: false,
            progress: 0,
            last_result: "Idle".to_string(),
            phase: JobPhase::Idle,
            cancel: CancellationToken::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Point-in-time view of one method, safe to hand to readers.
#[derive(Debug, Clone, Serialize)]
pub struct MethodStatus {
    pub method: Method,
    pub label: &'static str,
    pub running: bool,
    pub progress: u8,
    pub last_result: String,
    pub phase: JobPhase,
    pub cancel_requested: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct JobBoard {
    slots: [Mutex<JobState>; 3],
    events: broadcast::Sender<EngineEvent>,
}

fn slot_index(method: Method) -> usize {
    match method {
        Method::Sftp => 0,
        Method::SshSync => 1,
        Method::Cpanel => 2,
    }
}

impl JobBoard {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            slots: [
                Mutex::new(JobState::idle()),
                Mutex::new(JobState::idle()),
                Mutex::new(JobState::idle()),
            ],
            events,
        }
    }

    fn slot(&self, method: Method) -> MutexGuard<'_, JobState> {
        // State stays consistent under poisoning: every write is a plain field store.
        self.slots[slot_index(method)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a run for `method`, or `None` if one is already running.
    pub fn try_start(self: &Arc<Self>, method: Method) -> Option<RunTicket> {
        let (cancel, status) = {
            let mut state = self.slot(method);
            if state.running {
                return None;
            }
            state.running = true;
            state.progress = 0;
            state.last_result = "Starting...".to_string();
            state.phase = JobPhase::Idle;
            state.cancel = CancellationToken::new();
            state.started_at = Some(Utc::now());
            state.finished_at = None;
            (state.cancel.clone(), snapshot(method, &state))
        };
        self.publish(status);

        Some(RunTicket {
            board: Arc::clone(self),
            method,
            cancel,
            finished: false,
        })
    }

    /// Signal the running job to stop. Stopping an idle method does nothing.
    pub fn request_stop(&self, method: Method) -> bool {
        let status = {
            let state = self.slot(method);
            if !state.running {
                return false;
            }
            state.cancel.cancel();
            snapshot(method, &state)
        };
        self.publish(status);
        true
    }

    pub fn status(&self, method: Method) -> MethodStatus {
        snapshot(method, &self.slot(method))
    }

    pub fn statuses(&self) -> Vec<MethodStatus> {
        Method::ALL.iter().map(|m| self.status(*m)).collect()
    }

    pub fn any_running(&self) -> bool {
        Method::ALL.iter().any(|m| self.slot(*m).running)
    }

    pub fn is_running(&self, method: Method) -> bool {
        self.slot(method).running
    }

    fn advance(&self, method: Method, phase: JobPhase, progress: Option<u8>) {
        let status = {
            let mut state = self.slot(method);
            if !state.running {
                return;
            }
            state.phase = phase;
            if let Some(progress) = progress {
                state.progress = progress.min(100);
            }
            snapshot(method, &state)
        };
        self.publish(status);
    }

    fn finish(&self, method: Method, phase: JobPhase, result: String) {
        let status = {
            let mut state = self.slot(method);
            state.running = false;
            state.phase = phase;
            state.last_result = result;
            state.finished_at = Some(Utc::now());
            snapshot(method, &state)
        };
        self.publish(status);
    }

    fn publish(&self, status: MethodStatus) {
        // No subscribers is fine.
        let _ = self.events.send(EngineEvent::State(status));
    }
}

fn snapshot(method: Method, state: &JobState) -> MethodStatus {
    MethodStatus {
        method,
        label: method.label(),
        running: state.running,
        progress: state.progress,
        last_result: state.last_result.clone(),
        phase: state.phase,
        cancel_requested: state.running && state.cancel.is_cancelled(),
        started_at: state.started_at,
        finished_at: state.finished_at,
    }
}

/// Proof of admission for one run of one method.
pub struct RunTicket {
    board: Arc<JobBoard>,
    method: Method,
    cancel: CancellationToken,
    finished: bool,
}

impl RunTicket {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn advance(&self, phase: JobPhase, progress: u8) {
        self.board.advance(self.method, phase, Some(progress));
    }

    pub fn set_progress(&self, progress: u8) {
        let phase = self.board.status(self.method).phase;
        self.board.advance(self.method, phase, Some(progress));
    }

    /// Record the terminal result and release admission.
    pub fn finish(mut self, phase: JobPhase, result: impl Into<String>) {
        self.finished = true;
        let progress = if phase == JobPhase::Succeeded { Some(100) } else { None };
        if progress.is_some() {
            self.board.advance(self.method, phase, progress);
        }
        self.board.finish(self.method, phase, result.into());
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!(method = %self.method, "Backup job ended without a result");
            self.board.finish(
                self.method,
                JobPhase::Aborted,
                "Failed: job aborted unexpectedly".to_string(),
            );
        }
    }
}
