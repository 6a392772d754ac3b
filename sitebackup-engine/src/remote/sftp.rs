//! SFTP transport over an `ssh2` session.

use super::session::{close_session, open_session};
use super::{Handshake, RemoteConfig, RemoteEntry, RemoteSource};
use crate::utils::errors::{EngineError, Result};
use ssh2::{Session, Sftp};
use std::fs::File;
use std::path::Path;

pub struct SftpSource {
    config: RemoteConfig,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SftpSource {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: None,
            sftp: None,
        }
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| EngineError::Connection("SFTP channel is not open".into()))
    }
}

impl RemoteSource for SftpSource {
    fn connect(&mut self) -> Result<Handshake> {
        let sess = open_session(&self.config)?;
        let sftp = sess.sftp()?;
        self.sftp = Some(sftp);
        self.session = Some(sess);
        Ok(Handshake::Tree)
    }

    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let listing = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(|e| EngineError::listing(path, e))?;

        Ok(listing
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                    size_bytes: stat.size.unwrap_or(0),
                })
            })
            .collect())
    }

    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let mut remote_file = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| EngineError::fetch(remote, e))?;
        let mut local_file = File::create(local).map_err(|e| EngineError::fetch(remote, e))?;
        std::io::copy(&mut remote_file, &mut local_file).map_err(|e| EngineError::fetch(remote, e))
    }

    fn close(&mut self) {
        self.sftp = None;
        if let Some(sess) = self.session.take() {
            close_session(&sess);
        }
    }
}
