//! In-memory remote tree for exercising the walk and the job without a network.

use super::{Connector, Handshake, RemoteConfig, RemoteEntry, RemoteSource, ROOT_SENTINEL};
use crate::method::Method;
use crate::utils::errors::{EngineError, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct MemoryTree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    unreadable_dirs: HashSet<String>,
    unreadable_files: HashSet<String>,
    refuse_connect: bool,
    probe: Option<(String, String)>,
    cancel_after: Option<(usize, CancellationToken)>,
    pub closed: Arc<AtomicBool>,
    pub fetches: Arc<AtomicUsize>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; parent directories are implied.
    pub fn file(mut self, path: &str, contents: &[u8]) -> Self {
        for dir in Path::new(path).ancestors().skip(1) {
            let dir = dir.to_string_lossy();
            if !dir.is_empty() {
                self.dirs.insert(dir.into_owned());
            }
        }
        self.files.insert(path.to_string(), contents.to_vec());
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_string());
        self
    }

    pub fn unreadable_dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_string());
        self.unreadable_dirs.insert(path.to_string());
        self
    }

    pub fn unreadable_file(mut self, path: &str) -> Self {
        self.unreadable_files.insert(path.to_string());
        self
    }

    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn probe(mut self, marker_name: &str, contents: &str) -> Self {
        self.probe = Some((marker_name.to_string(), contents.to_string()));
        self
    }

    /// Cancel `token` once `n` files have been fetched.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter(|(path, _)| !self.unreadable_files.contains(*path))
            .map(|(_, data)| data.len() as u64)
            .sum()
    }

    fn children(&self, path: &str) -> Vec<RemoteEntry> {
        let prefix = if path == ROOT_SENTINEL {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        let direct = |candidate: &str| -> Option<String> {
            let rest = candidate.strip_prefix(prefix.as_str())?;
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        };

        let mut entries: Vec<RemoteEntry> = self
            .dirs
            .iter()
            .filter_map(|d| direct(d))
            .map(RemoteEntry::dir)
            .collect();
        entries.extend(
            self.files
                .iter()
                .filter_map(|(f, data)| direct(f).map(|name| RemoteEntry::file(name, data.len() as u64))),
        );
        entries
    }
}

impl RemoteSource for MemoryTree {
    fn connect(&mut self) -> Result<Handshake> {
        if self.refuse_connect {
            return Err(EngineError::Connection("connection refused".into()));
        }
        Ok(match &self.probe {
            Some((marker_name, contents)) => Handshake::Probe {
                marker_name: marker_name.clone(),
                contents: contents.clone(),
            },
            None => Handshake::Tree,
        })
    }

    fn list_entries(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        if self.unreadable_dirs.contains(path) {
            return Err(EngineError::listing(path, "permission denied"));
        }
        Ok(self.children(path))
    }

    fn fetch(&mut self, remote: &str, local: &Path) -> Result<u64> {
        if self.unreadable_files.contains(remote) {
            return Err(EngineError::fetch(remote, "permission denied"));
        }
        let data = self
            .files
            .get(remote)
            .ok_or_else(|| EngineError::fetch(remote, "no such file"))?;
        std::fs::write(local, data).map_err(|e| EngineError::fetch(remote, e))?;

        let fetched = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if fetched >= *n {
                token.cancel();
            }
        }
        Ok(data.len() as u64)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out clones of one tree for every method.
pub struct MemoryConnector {
    pub tree: Mutex<MemoryTree>,
}

impl MemoryConnector {
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            tree: Mutex::new(tree),
        }
    }
}

impl Connector for MemoryConnector {
    fn open(&self, _method: Method, _config: &RemoteConfig) -> Box<dyn RemoteSource> {
        let tree = self.tree.lock().map(|t| t.clone()).unwrap_or_default();
        Box::new(tree)
    }
}
