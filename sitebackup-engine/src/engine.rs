//! Process-wide engine: the per-method job board plus the shared logs, CPU
//! history and outbound seams every job uses.

use crate::events::{self, EngineEvent};
use crate::executor::{BackupJob, JobOutcome, StorageLayout};
use crate::jobs::{JobBoard, MethodStatus, RunTicket};
use crate::method::Method;
use crate::monitor::{CpuHistory, CpuSample, LogBuffer, LogEntry};
use crate::notify::{ArchiveStore, Notifier};
use crate::remote::{Connector, NetworkConnector, RemoteConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything a status reader needs in one consistent-enough read.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub methods: Vec<MethodStatus>,
    pub logs: Vec<LogEntry>,
    pub cpu_history: Vec<CpuSample>,
}

pub struct Engine {
    board: Arc<JobBoard>,
    logs: LogBuffer,
    cpu: CpuHistory,
    notifier: Arc<dyn Notifier>,
    archives: Arc<dyn ArchiveStore>,
    connector: Arc<dyn Connector>,
    layout: StorageLayout,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        layout: StorageLayout,
        notifier: Arc<dyn Notifier>,
        archives: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self::with_connector(layout, notifier, archives, Arc::new(NetworkConnector))
    }

    pub fn with_connector(
        layout: StorageLayout,
        notifier: Arc<dyn Notifier>,
        archives: Arc<dyn ArchiveStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let events = events::channel();
        Self {
            board: Arc::new(JobBoard::new(events.clone())),
            logs: LogBuffer::new(events.clone()),
            cpu: CpuHistory::new(events.clone()),
            notifier,
            archives,
            connector,
            layout,
            events,
        }
    }

    /// Admit a run of `method`. `None` when one is already running; the
    /// caller must not queue it.
    pub fn begin(&self, method: Method) -> Option<RunTicket> {
        let ticket = self.board.try_start(method);
        if ticket.is_none() {
            tracing::info!(method = %method, "Backup already running, start ignored");
        }
        ticket
    }

    /// Run an admitted job to completion. Blocks.
    pub fn run(&self, ticket: RunTicket, config: &RemoteConfig) -> JobOutcome {
        BackupJob {
            logs: &self.logs,
            notifier: self.notifier.as_ref(),
            archives: self.archives.as_ref(),
            connector: self.connector.as_ref(),
            layout: &self.layout,
        }
        .run(ticket, config)
    }

    /// Ask a running job to stop. No-op for an idle method.
    pub fn stop(&self, method: Method) -> bool {
        let signalled = self.board.request_stop(method);
        if signalled {
            self.logs.append(format!(
                "[{}] Stopping backup process requested by user...",
                method.label()
            ));
        }
        signalled
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.board.any_running(),
            methods: self.board.statuses(),
            logs: self.logs.snapshot(),
            cpu_history: self.cpu.snapshot(),
        }
    }

    pub fn method_status(&self, method: Method) -> MethodStatus {
        self.board.status(method)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn cpu(&self) -> &CpuHistory {
        &self.cpu
    }
}
