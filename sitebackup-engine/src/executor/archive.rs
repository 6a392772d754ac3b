//! Packaging of a staging directory into a timestamped `.tar.gz`.

use crate::method::Method;
use crate::utils::errors::ArchiveError;
use chrono::NaiveDateTime;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const NAME_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const ARCHIVE_EXT: &str = ".tar.gz";

/// `{method}_backup_{YYYYMMDD_HHMMSS}.tar.gz`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveName {
    pub method: Method,
    pub created: NaiveDateTime,
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_backup_{}{}",
            self.method.slug(),
            self.created.format(NAME_TIMESTAMP),
            ARCHIVE_EXT
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a backup archive name: {0}")]
pub struct InvalidArchiveName(pub String);

impl FromStr for ArchiveName {
    type Err = InvalidArchiveName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidArchiveName(s.to_string());
        let stem = s.strip_suffix(ARCHIVE_EXT).ok_or_else(invalid)?;
        let (slug, stamp) = stem.split_once("_backup_").ok_or_else(invalid)?;
        let method = slug.parse::<Method>().map_err(|_| invalid())?;
        if stamp.len() != 15 || !stamp.chars().all(|c| c.is_ascii_digit() || c == '_') {
            return Err(invalid());
        }
        let created = NaiveDateTime::parse_from_str(stamp, NAME_TIMESTAMP).map_err(|_| invalid())?;
        Ok(Self { method, created })
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltArchive {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Writes archives into one output directory.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    output_dir: PathBuf,
}

impl ArchiveBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Archive `staging_root` under the fixed root `{method}_backups`.
    ///
    /// `started` is the build start in the configured timezone and names the
    /// file. An archive of the same method built within the same second is
    /// overwritten. The staging directory is left in place.
    pub fn build(
        &self,
        method: Method,
        staging_root: &Path,
        started: NaiveDateTime,
    ) -> Result<BuiltArchive, ArchiveError> {
        if !staging_root.is_dir() {
            return Err(ArchiveError::MissingStaging(staging_root.to_path_buf()));
        }
        if is_empty_dir(staging_root) {
            return Err(ArchiveError::EmptyStaging(staging_root.to_path_buf()));
        }

        let filename = ArchiveName { method, created: started }.to_string();
        let path = self.output_dir.join(&filename);
        let write_err = |source: std::io::Error| ArchiveError::Write {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(write_err)?;
        let file = File::create(&path).map_err(write_err)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.follow_symlinks(false);
        tar.append_dir_all(method.staging_dir_name(), staging_root)
            .map_err(write_err)?;
        let encoder = tar.into_inner().map_err(write_err)?;
        encoder.finish().map_err(write_err)?;

        let size_bytes = std::fs::metadata(&path).map_err(write_err)?.len();
        tracing::info!(method = %method, filename = %filename, size_bytes, "Archive written");

        Ok(BuiltArchive {
            filename,
            path,
            size_bytes,
        })
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
