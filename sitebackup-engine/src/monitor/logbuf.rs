//! Rolling log shown in the dashboard.

use crate::events::EngineEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Keeps the newest [`LOG_CAPACITY`] messages. Every append is mirrored to
/// `tracing` and published as [`EngineEvent::Log`].
pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    events: broadcast::Sender<EngineEvent>,
}

impl LogBuffer {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
            events,
        }
    }

    pub fn append(&self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        };
        tracing::info!(target: "backup_log", "{}", entry.message);

        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.len() == LOG_CAPACITY {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        let _ = self.events.send(EngineEvent::Log(entry));
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_keeps_newest_hundred() {
        let logs = LogBuffer::new(crate::events::channel());
        for i in 0..150 {
            logs.append(format!("line {}", i));
        }
        let entries = logs.snapshot();
        assert_eq!(entries.len(), LOG_CAPACITY);
        assert_eq!(entries.first().unwrap().message, "line 50");
        assert_eq!(entries.last().unwrap().message, "line 149");
    }

    #[test]
    fn test_append_publishes_event() {
        let tx = crate::events::channel();
        let mut rx = tx.subscribe();
        let logs = LogBuffer::new(tx);
        logs.append("[SSH] Sync started");

        match rx.try_recv().unwrap() {
            EngineEvent::Log(entry) => assert_eq!(entry.message, "[SSH] Sync started"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
