//! Events the engine fans out to live viewers.

use crate::jobs::MethodStatus;
use crate::monitor::{CpuSample, LogEntry};
use serde::Serialize;
use tokio::sync::broadcast;

/// Queued events per subscriber before a slow viewer starts lagging.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "log:append")]
    Log(LogEntry),

    #[serde(rename = "job:state")]
    State(MethodStatus),

    #[serde(rename = "cpu:sample")]
    Cpu(CpuSample),
}

pub fn channel() -> broadcast::Sender<EngineEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_wire_shape() {
        let entry = LogEntry {
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 7, 26, 3, 0, 0).unwrap(),
            message: "[SFTP] Connected".into(),
        };
        let json = serde_json::to_value(EngineEvent::Log(entry)).unwrap();
        assert_eq!(json["type"], "log:append");
        assert_eq!(json["payload"]["message"], "[SFTP] Connected");
    }
}
