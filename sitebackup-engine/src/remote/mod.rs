//! Remote transports a backup can read from.
//!
//! Every method is reached through the same [`RemoteSource`] capability so the
//! tree walk and the job orchestration are written once. All calls block; the
//! job runs them on a blocking thread.

pub mod cpanel;
#[cfg(test)]
pub mod memory;
pub mod session;
pub mod sftp;
pub mod ssh_sync;

use crate::method::Method;
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Remote directory the walk starts from when no path is configured.
pub const ROOT_SENTINEL: &str = ".";

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size_bytes,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size_bytes: 0,
        }
    }
}

/// What a successful connect makes available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// A file tree is ready to be walked.
    Tree,
    /// No tree to walk; the job stages this marker file instead.
    Probe {
        marker_name: String,
        contents: String,
    },
}

/// Connection settings for one method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    /// Zero means the method's default port.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    /// Password, or API token for cPanel.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    /// Private key file for SSH based methods; tried before the password.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

fn default_remote_path() -> String {
    ROOT_SENTINEL.to_string()
}

impl RemoteConfig {
    /// Remote root of the walk, falling back to the login directory.
    pub fn root(&self) -> &str {
        let trimmed = self.remote_path.trim();
        if trimmed.is_empty() {
            ROOT_SENTINEL
        } else {
            trimmed
        }
    }

    pub fn has_host(&self) -> bool {
        !self.host.trim().is_empty()
    }

    pub fn with_default_port(mut self, method: Method) -> Self {
        if self.port == 0 {
            self.port = method.default_port();
        }
        self
    }
}

pub trait RemoteSource: Send {
    fn connect(&mut self) -> Result<Handshake>;

    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Copy one remote file to `local`, returning the number of bytes written.
    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64>;

    /// Release the connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens the transport for a method. Injected so tests can walk in-memory trees.
pub trait Connector: Send + Sync {
    fn open(&self, method: Method, config: &RemoteConfig) -> Box<dyn RemoteSource>;
}

/// Connector backed by the real network transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnector;

impl Connector for NetworkConnector {
    fn open(&self, method: Method, config: &RemoteConfig) -> Box<dyn RemoteSource> {
        let config = config.clone().with_default_port(method);
        match method {
            Method::Sftp => Box::new(sftp::SftpSource::new(config)),
            Method::SshSync => Box::new(ssh_sync::SshSyncSource::new(config)),
            Method::Cpanel => Box::new(cpanel::CpanelSource::new(config)),
        }
    }
}

/// Closes the wrapped source when dropped, whichever way the job exits.
pub struct ConnectionGuard {
    source: Box<dyn RemoteSource>,
}

impl ConnectionGuard {
    pub fn new(source: Box<dyn RemoteSource>) -> Self {
        Self { source }
    }

    pub fn source(&mut self) -> &mut dyn RemoteSource {
        self.source.as_mut()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.source.close();
    }
}
