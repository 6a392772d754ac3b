//! Outbound contracts of a job: outcome email and the archive index.
//!
//! The engine only defines the seams; the service supplies SMTP delivery and
//! database persistence.

use crate::method::Method;
use crate::utils::errors::{NotifyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a notification that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No mail relay configured.
    Skipped,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str) -> std::result::Result<Delivery, NotifyError>;
}

/// Index entry for one archive produced by a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub filename: String,
    /// Payload bytes synced for the run, not the compressed file size.
    pub size_bytes: u64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub method: Method,
}

pub const STATUS_SUCCESS: &str = "Success";

pub trait ArchiveStore: Send + Sync {
    fn record(&self, record: &ArchiveRecord) -> Result<()>;
}

pub fn success_subject(method: Method) -> String {
    format!("{} Backup Success", method.label())
}

pub fn failure_subject(method: Method) -> String {
    format!("{} Backup Failed", method.label())
}

pub fn success_body(filename: &str, files_count: u64, total_bytes: u64) -> String {
    format!(
        "Backup: {}\nFiles: {}\nSize: {:.2} MB",
        filename,
        files_count,
        total_bytes as f64 / 1024.0 / 1024.0
    )
}

pub fn failure_body(error: &str) -> String {
    format!("Error: {}", error)
}
