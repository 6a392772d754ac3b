//! Error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Auth or network failure while reaching the remote. Terminal for a job.
    #[error("Connection error: {0}")]
    Connection(String),

    /// One remote directory could not be listed. The subtree is skipped.
    #[error("Listing error for {path}: {message}")]
    Listing { path: String, message: String },

    /// One remote file could not be read or written locally. The file is skipped.
    #[error("Fetch error for {path}: {message}")]
    Fetch { path: String, message: String },

    #[error("Archiving error: {0}")]
    Archiving(#[from] ArchiveError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn listing(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Listing {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn fetch(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<ssh2::Error> for EngineError {
    fn from(e: ssh2::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("staging directory {0} does not exist")]
    MissingStaging(PathBuf),

    #[error("staging directory {0} is empty")]
    EmptyStaging(PathBuf),

    #[error("failed to write archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Nothing was staged, as opposed to a failed write.
    pub fn is_nothing_to_archive(&self) -> bool {
        matches!(self, Self::MissingStaging(_) | Self::EmptyStaging(_))
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Bad address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("SMTP send failed: {0}")]
    Transport(String),

    #[error("Settings unavailable: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
