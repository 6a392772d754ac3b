//! Backup methods. Every per-method structure in the engine is keyed by one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Sftp,
    #[serde(rename = "ssh")]
    SshSync,
    Cpanel,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Sftp, Method::SshSync, Method::Cpanel];

    /// Stable identifier used in archive names, URLs and the database.
    pub fn slug(self) -> &'static str {
        match self {
            Method::Sftp => "sftp",
            Method::SshSync => "ssh",
            Method::Cpanel => "cpanel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::Sftp => "SFTP",
            Method::SshSync => "SSH",
            Method::Cpanel => "cPanel",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Method::Sftp | Method::SshSync => 22,
            Method::Cpanel => 2083,
        }
    }

    /// Name of the root directory inside the archive and of the staging directory.
    pub fn staging_dir_name(self) -> String {
        format!("{}_backups", self.slug())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backup method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sftp" => Ok(Method::Sftp),
            "ssh" | "ssh_sync" | "ssh-sync" => Ok(Method::SshSync),
            "cpanel" => Ok(Method::Cpanel),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}
