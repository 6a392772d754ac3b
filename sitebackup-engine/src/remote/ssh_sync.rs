//! SSH sync transport: directory listings come from a remote `find`, file
//! contents are pulled over SCP.

use super::session::{close_session, open_session};
use super::{Handshake, RemoteConfig, RemoteEntry, RemoteSource};
use crate::utils::errors::{EngineError, Result};
use ssh2::Session;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub struct SshSyncSource {
    config: RemoteConfig,
    session: Option<Session>,
}

impl SshSyncSource {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| EngineError::Connection("SSH session is not open".into()))
    }

    fn exec(&self, cmd: &str) -> Result<ExecOutput> {
        let mut channel = self.session()?.channel_session()?;
        channel.exec(cmd)?;

        let mut buf = String::new();
        let stdout = channel.read_to_string(&mut buf).map(|_| buf);
        let mut stderr = String::new();
        // Diagnostic only.
        let _ = channel.stderr().read_to_string(&mut stderr);
        channel.wait_close()?;
        Ok(ExecOutput {
            status: channel.exit_status()?,
            stdout,
            stderr,
        })
    }
}

struct ExecOutput {
    status: i32,
    stdout: std::io::Result<String>,
    stderr: String,
}

/// Entries of one `find` run. A cut-short stdout fails the listing even when
/// the exit status reads as success.
fn listing_from(path: &str, output: ExecOutput) -> Result<Vec<RemoteEntry>> {
    let stdout = output.stdout.map_err(|e| EngineError::listing(path, e))?;
    if output.status != 0 {
        return Err(EngineError::listing(
            path,
            format!("find exited with {}: {}", output.status, output.stderr.trim()),
        ));
    }
    Ok(parse_find_output(&stdout))
}

impl RemoteSource for SshSyncSource {
    fn connect(&mut self) -> Result<Handshake> {
        self.session = Some(open_session(&self.config)?);
        Ok(Handshake::Tree)
    }

    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let cmd = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf '%y\\t%s\\t%f\\n'",
            shell_quote(path)
        );
        let output = self.exec(&cmd).map_err(|e| match e {
            EngineError::Connection(message) => EngineError::Listing {
                path: path.to_string(),
                message,
            },
            other => other,
        })?;
        listing_from(path, output)
    }

    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let (mut channel, _stat) = self
            .session()?
            .scp_recv(Path::new(remote))
            .map_err(|e| EngineError::fetch(remote, e))?;
        let mut local_file = File::create(local).map_err(|e| EngineError::fetch(remote, e))?;
        let written =
            std::io::copy(&mut channel, &mut local_file).map_err(|e| EngineError::fetch(remote, e))?;

        // SCP channel teardown; the bytes are already on disk.
        let _ = channel.send_eof();
        let _ = channel.wait_eof();
        let _ = channel.close();
        let _ = channel.wait_close();
        Ok(written)
    }

    fn close(&mut self) {
        if let Some(sess) = self.session.take() {
            close_session(&sess);
        }
    }
}

/// Parse `%y\t%s\t%f` lines. Anything that is neither a regular file nor a
/// directory (symlinks, sockets, devices) is left out.
fn parse_find_output(output: &str) -> Vec<RemoteEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let kind = parts.next()?;
            let size = parts.next()?.trim().parse::<u64>().unwrap_or(0);
            let name = parts.next()?;
            if name.is_empty() {
                return None;
            }
            match kind {
                "d" => Some(RemoteEntry::dir(name)),
                "f" => Some(RemoteEntry::file(name, size)),
                _ => None,
            }
        })
        .collect()
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
